//! Prompt assembly for team runs

use crate::registry::{Member, ResolvedTeam};
use crewhub_core::{PersonaDoc, ProductDoc, Turn};
use std::fmt::Write;

/// Everything besides the team that shapes one run.
#[derive(Debug, Default)]
pub struct RunContext<'a> {
    pub history: &'a [Turn],
    pub knowledge_base: Option<&'a str>,
    pub product: Option<&'a ProductDoc>,
    pub persona: Option<&'a PersonaDoc>,
}

/// User message: contextual background sections followed by the task.
pub fn assemble_task(ctx: &RunContext<'_>, prompt: &str) -> String {
    let mut parts = Vec::new();

    if !ctx.history.is_empty() {
        let lines: Vec<String> = ctx
            .history
            .iter()
            .map(|turn| format!("Previous {}: {}", turn.role, turn.content))
            .collect();
        parts.push(format!("## Session History\n{}", lines.join("\n")));
    }
    if let Some(kb) = ctx.knowledge_base {
        parts.push(format!("## Company-Wide Knowledge Base\n{}", kb));
    }
    if let Some(product) = ctx.product {
        parts.push(format!(
            "## Knowledge Base for Product: '{}'\n{}",
            product.product_name, product.knowledge_base
        ));
    }
    if let Some(persona) = ctx.persona {
        parts.push(format!(
            "## Persona Profile to Embody: {}\nRole: {}\nGoals: {}\nBackground: {}",
            persona.name,
            persona.role,
            persona.goals.join(", "),
            persona.background.as_deref().unwrap_or("N/A")
        ));
    }

    let mut task = String::new();
    if !parts.is_empty() {
        task.push_str("--- CONTEXTUAL BACKGROUND ---\n");
        task.push_str(&parts.join("\n\n"));
        task.push_str("\n\n");
    }
    task.push_str("--- YOUR CURRENT TASK ---\n");
    task.push_str(prompt);
    task.trim().to_string()
}

/// System prompt describing the team and, recursively, its members.
/// Agents without a model reference show `default_model`.
pub fn render_team(team: &ResolvedTeam, default_model: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are coordinating the team '{}' ({}). Work through its members to complete the task.",
        team.doc.team_name, team.key
    );
    if let Some(description) = &team.doc.description {
        let _ = writeln!(out, "\nTeam description: {}", description);
    }
    if let Some(instructions) = &team.doc.instructions {
        let _ = writeln!(out, "\n## Coordination Instructions\n{}", instructions);
    }
    if let Some(criteria) = &team.doc.success_criteria {
        let _ = writeln!(out, "\n## Success Criteria\n{}", criteria);
    }
    let _ = writeln!(out, "\n## Members");
    render_members(&mut out, team, default_model, 0);
    out.trim_end().to_string()
}

fn render_members(out: &mut String, team: &ResolvedTeam, default_model: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    if team.members.is_empty() {
        let _ = writeln!(out, "{}(no members)", indent);
        return;
    }
    for member in &team.members {
        match member {
            Member::Agent(agent) => {
                let doc = &agent.doc;
                let _ = writeln!(out, "{}- Agent '{}' ({}): {}", indent, doc.name, agent.key, doc.role);
                let _ = writeln!(out, "{}  Description: {}", indent, doc.description);
                if let Some(instructions) = &doc.instructions {
                    let _ = writeln!(out, "{}  Instructions: {}", indent, instructions);
                }
                if !doc.tools.is_empty() {
                    let _ = writeln!(out, "{}  Tools: {}", indent, doc.tools.join(", "));
                }
                let _ = writeln!(
                    out,
                    "{}  Model: {}",
                    indent,
                    doc.model.as_deref().unwrap_or(default_model)
                );
            }
            Member::Team(sub) => {
                let _ = writeln!(out, "{}- Team '{}' ({})", indent, sub.doc.team_name, sub.key);
                if let Some(instructions) = &sub.doc.instructions {
                    let _ = writeln!(out, "{}  Instructions: {}", indent, instructions);
                }
                render_members(out, sub, default_model, depth + 1);
            }
        }
    }
}
