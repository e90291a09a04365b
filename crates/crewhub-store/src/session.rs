//! Session Store - append-only conversation history per session
//!
//! File layout: `<sessions_dir>/session-<id>.json`, one record per file.

use crate::fsutil::write_atomic;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crewhub_core::{Error, Result, SessionKey, Turn};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Persisted session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionKey,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub initial_args: Value,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub artifacts: Vec<Value>,
}

impl SessionRecord {
    fn new(initial_context: Option<String>) -> Result<Self> {
        let session_id = SessionKey::parse(uuid::Uuid::new_v4().to_string())?;
        let history = match initial_context.as_deref() {
            Some(ctx) if !ctx.is_empty() => {
                vec![Turn::system(format!("Session initiated with context: {}", ctx))]
            }
            _ => Vec::new(),
        };
        Ok(Self {
            session_id,
            status: "active".into(),
            created_at: Utc::now(),
            initial_args: json!({ "initial_context": initial_context }),
            history,
            artifacts: Vec::new(),
        })
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a new session, recording a non-empty initial context as a system turn.
    async fn create(&self, initial_context: Option<String>) -> Result<SessionRecord>;

    /// Append one turn. Fails with `NotFound` for unknown sessions.
    async fn append(&self, session_id: &SessionKey, turn: Turn) -> Result<()>;

    /// Every turn in order. Fails with `NotFound` for unknown sessions.
    async fn read_all(&self, session_id: &SessionKey) -> Result<Vec<Turn>>;
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

pub struct FileSessionStore {
    dir: PathBuf,
    ttl: Duration,
    /// Serializes read-modify-write of session files.
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub async fn open(dir: impl Into<PathBuf>, ttl_hours: u64) -> Result<Self> {
        let ttl = i64::try_from(ttl_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| Error::Config(format!("session_ttl_hours out of range: {}", ttl_hours)))?;
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Storage(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(Self {
            dir,
            ttl,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path_for(&self, session_id: &SessionKey) -> PathBuf {
        self.dir.join(format!("session-{}.json", session_id))
    }

    async fn read_record(&self, session_id: &SessionKey) -> Result<SessionRecord> {
        let path = self.path_for(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found("session", session_id.as_str()))
            }
            Err(e) => return Err(Error::Storage(format!("cannot read {}: {}", path.display(), e))),
        };
        serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("corrupt session file {}: {}", path.display(), e)))
    }

    async fn write_record(&self, record: &SessionRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.path_for(&record.session_id), &bytes).await
    }

    /// Remove sessions older than the TTL and session files that do not parse.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        // A TTL reaching past the earliest representable time expires nothing by age.
        let cutoff = Utc::now()
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_session_file(&path) {
                continue;
            }
            let expired = match tokio::fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<SessionRecord>(&content) {
                    Ok(record) => record.created_at < cutoff,
                    Err(e) => {
                        warn!("Removing unreadable session file {}: {}", path.display(), e);
                        true
                    }
                },
                Err(e) => {
                    warn!("Cannot read session file {}: {}", path.display(), e);
                    false
                }
            };
            if expired {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        }

        if removed > 0 {
            info!("Cleaned up {} expired session(s)", removed);
        }
        Ok(removed)
    }
}

fn is_session_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("session-") && n.ends_with(".json"))
        .unwrap_or(false)
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, initial_context: Option<String>) -> Result<SessionRecord> {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.cleanup_expired().await {
            warn!("Session cleanup failed: {}", e);
        }

        let record = SessionRecord::new(initial_context)?;
        self.write_record(&record).await?;
        info!("Session {} started", record.session_id);
        Ok(record)
    }

    async fn append(&self, session_id: &SessionKey, turn: Turn) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read_record(session_id).await?;
        debug!("Session {}: appending {} turn", session_id, turn.role);
        record.history.push(turn);
        self.write_record(&record).await
    }

    async fn read_all(&self, session_id: &SessionKey) -> Result<Vec<Turn>> {
        Ok(self.read_record(session_id).await?.history)
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionKey, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, initial_context: Option<String>) -> Result<SessionRecord> {
        let record = SessionRecord::new(initial_context)?;
        self.sessions.insert(record.session_id.clone(), record.clone());
        Ok(record)
    }

    async fn append(&self, session_id: &SessionKey, turn: Turn) -> Result<()> {
        let mut record = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::not_found("session", session_id.as_str()))?;
        record.history.push(turn);
        Ok(())
    }

    async fn read_all(&self, session_id: &SessionKey) -> Result<Vec<Turn>> {
        self.sessions
            .get(session_id)
            .map(|r| r.history.clone())
            .ok_or_else(|| Error::not_found("session", session_id.as_str()))
    }
}
