use crewhub_core::{Error, Result};
use std::path::Path;

/// Write `bytes` to a sibling temp file, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| Error::Storage(format!("failed to write {}: {}", tmp.display(), e)))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::Storage(format!(
            "failed to replace {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}
