use std::path::Path;
use tracing::{debug, warn};

/// Read the company-wide knowledge base. Missing, unreadable or blank files yield `None`.
pub async fn load_knowledge_base(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => None,
        Ok(content) => Some(content.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No knowledge base at {}", path.display());
            None
        }
        Err(e) => {
            warn!("Failed to read knowledge base {}: {}", path.display(), e);
            None
        }
    }
}
