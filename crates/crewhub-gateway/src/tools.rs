//! Tool catalogue served by `tools/list`

use crewhub_core::{EntityKind, FieldType, ToolDescriptor};
use serde_json::{json, Map, Value};

/// Name of the single-entity read tool for a kind.
pub fn get_tool(kind: EntityKind) -> String {
    match kind {
        EntityKind::Team => "get_team_config".to_string(),
        _ => format!("get_{}", kind),
    }
}

/// Every tool the server answers, in catalogue order.
pub fn catalogue() -> Vec<ToolDescriptor> {
    let mut tools = vec![ToolDescriptor {
        name: "start_session".into(),
        description: "Start a new session and return its id. Pass the id to run_ai_team to \
                      carry conversation history between runs."
            .into(),
        input_schema: object(
            json!({ "initial_context": { "type": "string", "description": "Optional context recorded as the first turn" } }),
            &[],
        ),
    }];

    for kind in EntityKind::ALL {
        tools.extend(crud_tools(kind));
    }

    tools.push(ToolDescriptor {
        name: "run_ai_team".into(),
        description: "Run a team against a prompt with optional session, persona and product \
                      context. Fails when the team is in config_error."
            .into(),
        input_schema: object(
            json!({
                "team_name": { "type": "string", "description": "Key of the team to run" },
                "prompt": { "type": "string" },
                "session_id": { "type": "string" },
                "persona_key": { "type": "string" },
                "product_key": { "type": "string" }
            }),
            &["team_name", "prompt"],
        ),
    });
    tools
}

pub fn is_known(name: &str) -> bool {
    catalogue().iter().any(|tool| tool.name == name)
}

fn crud_tools(kind: EntityKind) -> Vec<ToolDescriptor> {
    let key = format!("{}_key", kind);
    let mut key_schema = json!({});
    key_schema[key.as_str()] = json!({ "type": "string", "description": format!("Unique {} key", kind) });
    let mut with_data = key_schema.clone();
    with_data["data"] = document_schema(kind, false);
    let mut with_patch = key_schema.clone();
    with_patch["data"] = document_schema(kind, true);

    vec![
        ToolDescriptor {
            name: format!("create_{}", kind),
            description: format!("Create a new {}.", kind),
            input_schema: object(with_data, &[key.as_str(), "data"]),
        },
        ToolDescriptor {
            name: format!("list_{}", kind.plural()),
            description: format!("List all {}.", kind.plural()),
            input_schema: object(json!({}), &[]),
        },
        ToolDescriptor {
            name: get_tool(kind),
            description: format!("Get the full document of one {}.", kind),
            input_schema: object(key_schema.clone(), &[key.as_str()]),
        },
        ToolDescriptor {
            name: format!("update_{}", kind),
            description: format!("Update fields of an existing {}.", kind),
            input_schema: object(with_patch, &[key.as_str(), "data"]),
        },
        ToolDescriptor {
            name: format!("delete_{}", kind),
            description: format!("Delete a {}.", kind),
            input_schema: object(key_schema, &[key.as_str()]),
        },
    ]
}

/// JSON schema of a kind's document; a patch has no required fields.
fn document_schema(kind: EntityKind, patch: bool) -> Value {
    let schema = kind.schema();
    let mut properties = Map::new();
    for (name, ty) in schema.fields {
        let property = match ty {
            FieldType::Str => json!({ "type": "string" }),
            FieldType::StrList => json!({ "type": "array", "items": { "type": "string" } }),
        };
        properties.insert(name.to_string(), property);
    }
    let required: &[&str] = if patch { &[] } else { schema.required };
    object(Value::Object(properties), required)
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
