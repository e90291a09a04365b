//! Entity Store - key-value persistence for persona, product, agent and team documents
//!
//! One JSON object per kind (`personas.json`, `products.json`, ...) mapping
//! key to document. Writes replace the whole file atomically; the in-memory
//! copy only changes after the file write succeeded.

use crate::fsutil::write_atomic;
use async_trait::async_trait;
use crewhub_core::{Document, EntityKind, Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

type Collection = BTreeMap<String, Document>;

/// Persistence interface for entity documents.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch one document. Fails with `NotFound`.
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Document>;

    /// Insert or replace a document.
    async fn put(&self, kind: EntityKind, key: &str, doc: Document) -> Result<()>;

    /// Remove a document. Fails with `NotFound`.
    async fn delete(&self, kind: EntityKind, key: &str) -> Result<()>;

    /// All keys of a kind, sorted.
    async fn list_keys(&self, kind: EntityKind) -> Result<Vec<String>>;

    /// All documents of a kind, sorted by key.
    async fn list(&self, kind: EntityKind) -> Result<Vec<(String, Document)>>;

    async fn exists(&self, kind: EntityKind, key: &str) -> Result<bool> {
        match self.get(kind, key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

pub struct JsonFileEntityStore {
    dir: PathBuf,
    collections: Mutex<HashMap<EntityKind, Collection>>,
}

impl JsonFileEntityStore {
    /// Open (creating if needed) the data directory and load every collection.
    /// A collection file that exists but does not parse is an error, never silently emptied.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Storage(format!("cannot create {}: {}", dir.display(), e)))?;

        let mut collections = HashMap::new();
        for kind in EntityKind::ALL {
            let path = collection_path(&dir, kind);
            let collection = load_collection(&path).await?;
            debug!("Loaded {} {} from {}", collection.len(), kind.plural(), path.display());
            collections.insert(kind, collection);
        }
        info!("Entity store opened at {}", dir.display());

        Ok(Self {
            dir,
            collections: Mutex::new(collections),
        })
    }

    async fn persist(&self, kind: EntityKind, collection: &Collection) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(collection)?;
        write_atomic(&collection_path(&self.dir, kind), &bytes).await
    }
}

fn collection_path(dir: &Path, kind: EntityKind) -> PathBuf {
    dir.join(format!("{}.json", kind.plural()))
}

async fn load_collection(path: &Path) -> Result<Collection> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Collection::new()),
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("corrupt {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Collection::new()),
        Err(e) => Err(Error::Storage(format!("cannot read {}: {}", path.display(), e))),
    }
}

#[async_trait]
impl EntityStore for JsonFileEntityStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Document> {
        let collections = self.collections.lock().await;
        collections
            .get(&kind)
            .and_then(|c| c.get(key))
            .cloned()
            .ok_or_else(|| Error::not_found(kind, key))
    }

    async fn put(&self, kind: EntityKind, key: &str, doc: Document) -> Result<()> {
        let mut collections = self.collections.lock().await;
        let mut next = collections.get(&kind).cloned().unwrap_or_default();
        next.insert(key.to_string(), doc);
        self.persist(kind, &next).await?;
        collections.insert(kind, next);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<()> {
        let mut collections = self.collections.lock().await;
        let mut next = collections.get(&kind).cloned().unwrap_or_default();
        if next.remove(key).is_none() {
            return Err(Error::not_found(kind, key));
        }
        self.persist(kind, &next).await?;
        collections.insert(kind, next);
        Ok(())
    }

    async fn list_keys(&self, kind: EntityKind) -> Result<Vec<String>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(&kind)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<(String, Document)>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(&kind)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

/// Volatile store for tests and dry runs.
#[derive(Default)]
pub struct MemoryEntityStore {
    collections: Mutex<HashMap<EntityKind, Collection>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn get(&self, kind: EntityKind, key: &str) -> Result<Document> {
        let collections = self.collections.lock().await;
        collections
            .get(&kind)
            .and_then(|c| c.get(key))
            .cloned()
            .ok_or_else(|| Error::not_found(kind, key))
    }

    async fn put(&self, kind: EntityKind, key: &str, doc: Document) -> Result<()> {
        let mut collections = self.collections.lock().await;
        collections.entry(kind).or_default().insert(key.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<()> {
        let mut collections = self.collections.lock().await;
        collections
            .get_mut(&kind)
            .and_then(|c| c.remove(key))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(kind, key))
    }

    async fn list_keys(&self, kind: EntityKind) -> Result<Vec<String>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(&kind)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<(String, Document)>> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(&kind)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
