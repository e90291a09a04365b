//! Core types for crewhub: entity kinds, raw documents and their typed views

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A stored entity document, kept exactly as the client wrote it.
pub type Document = serde_json::Map<String, Value>;

/// The four kinds of entity the store holds.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Persona,
    Product,
    Agent,
    Team,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Persona, Self::Product, Self::Agent, Self::Team];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persona => "persona",
            Self::Product => "product",
            Self::Agent => "agent",
            Self::Team => "team",
        }
    }

    /// Plural form, used for file names and list messages.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Persona => "personas",
            Self::Product => "products",
            Self::Agent => "agents",
            Self::Team => "teams",
        }
    }

    pub fn schema(&self) -> &'static Schema {
        match self {
            Self::Persona => &PERSONA_SCHEMA,
            Self::Product => &PRODUCT_SCHEMA,
            Self::Agent => &AGENT_SCHEMA,
            Self::Team => &TEAM_SCHEMA,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "persona" | "personas" => Ok(Self::Persona),
            "product" | "products" => Ok(Self::Product),
            "agent" | "agents" => Ok(Self::Agent),
            "team" | "teams" => Ok(Self::Team),
            _ => Err(Error::validation(format!("unknown entity kind: {}", s))),
        }
    }
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

/// JSON type accepted for a document field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Str,
    StrList,
}

impl FieldType {
    fn name(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::StrList => "list",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::StrList => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Field layout of one entity kind.
#[derive(Debug)]
pub struct Schema {
    pub kind: EntityKind,
    pub fields: &'static [(&'static str, FieldType)],
    pub required: &'static [&'static str],
}

pub static PERSONA_SCHEMA: Schema = Schema {
    kind: EntityKind::Persona,
    fields: &[
        ("name", FieldType::Str),
        ("role", FieldType::Str),
        ("goals", FieldType::StrList),
        ("background", FieldType::Str),
    ],
    required: &["name", "role", "goals"],
};

pub static PRODUCT_SCHEMA: Schema = Schema {
    kind: EntityKind::Product,
    fields: &[
        ("product_name", FieldType::Str),
        ("description", FieldType::Str),
        ("knowledge_base", FieldType::Str),
    ],
    required: &["product_name", "description", "knowledge_base"],
};

pub static AGENT_SCHEMA: Schema = Schema {
    kind: EntityKind::Agent,
    fields: &[
        ("name", FieldType::Str),
        ("role", FieldType::Str),
        ("description", FieldType::Str),
        ("tools", FieldType::StrList),
        ("instructions", FieldType::Str),
        ("model", FieldType::Str),
    ],
    required: &["name", "role", "description"],
};

pub static TEAM_SCHEMA: Schema = Schema {
    kind: EntityKind::Team,
    fields: &[
        ("team_name", FieldType::Str),
        ("description", FieldType::Str),
        ("members", FieldType::StrList),
        ("instructions", FieldType::Str),
        ("success_criteria", FieldType::Str),
    ],
    required: &["team_name", "members"],
};

impl Schema {
    fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, ty)| *ty)
    }

    fn allowed(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(name, _)| *name).collect()
    }

    /// Validate a complete document. Unknown fields are tolerated and kept.
    pub fn validate(&self, doc: &Document) -> Result<()> {
        let mut missing: Vec<&str> = self
            .required
            .iter()
            .copied()
            .filter(|field| !doc.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(Error::validation(format!(
                "{} is missing required fields: {:?}",
                self.kind, missing
            )));
        }

        for (name, value) in doc {
            if let Some(ty) = self.field_type(name) {
                if !ty.matches(value) {
                    return Err(Error::validation(format!(
                        "field '{}' has the wrong type: expected {}, got {}",
                        name,
                        ty.name(),
                        json_type_name(value)
                    )));
                }
            }
        }
        Ok(())
    }

    /// Merge a partial update onto `current`. Patch fields outside the schema are rejected.
    pub fn merge(&self, current: &Document, patch: &Document) -> Result<Document> {
        for (name, value) in patch {
            let ty = self.field_type(name).ok_or_else(|| {
                Error::validation(format!(
                    "invalid field '{}'; allowed fields for {}: {:?}",
                    name,
                    self.kind,
                    self.allowed()
                ))
            })?;
            if !ty.matches(value) {
                return Err(Error::validation(format!(
                    "field '{}' has the wrong type: expected {}, got {}",
                    name,
                    ty.name(),
                    json_type_name(value)
                )));
            }
        }

        let mut merged = current.clone();
        for (name, value) in patch {
            merged.insert(name.clone(), value.clone());
        }
        self.validate(&merged)?;
        Ok(merged)
    }
}

/// Entity keys must be non-empty and free of surrounding whitespace.
pub fn validate_key(kind: EntityKind, key: &str) -> Result<()> {
    if key.is_empty() || key.trim() != key {
        return Err(Error::validation(format!(
            "invalid {} key '{}': keys must be non-empty without surrounding whitespace",
            kind, key
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Typed views
// ---------------------------------------------------------------------------

/// Deserialize a validated document into its typed view.
pub fn parse_document<T: DeserializeOwned>(kind: EntityKind, doc: &Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc.clone()))
        .map_err(|e| Error::validation(format!("malformed {} document: {}", kind, e)))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonaDoc {
    pub name: String,
    pub role: String,
    pub goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductDoc {
    pub product_name: String,
    pub description: String,
    pub knowledge_base: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentDoc {
    pub name: String,
    pub role: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Opaque capability handles, passed through to the provider untouched.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Model-provider reference for this agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamDoc {
    pub team_name: String,
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<String>,
}

impl TeamDoc {
    /// Member keys with duplicates collapsed to their first occurrence.
    pub fn unique_members(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.members
            .iter()
            .map(String::as_str)
            .filter(|m| seen.insert(*m))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Session identifier - cheaply cloneable, restricted to `[A-Za-z0-9_-]`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::validation(format!("invalid session_id format: {}", s)));
        }
        Ok(Self(Arc::from(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SessionKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.0.to_string()
    }
}

/// Speaker of a session turn
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in a session's append-only history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
