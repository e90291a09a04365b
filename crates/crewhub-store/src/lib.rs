//! crewhub Store - Entity and session persistence behind async traits

pub mod entity;
mod fsutil;
pub mod knowledge;
pub mod session;

pub use entity::{EntityStore, JsonFileEntityStore, MemoryEntityStore};
pub use knowledge::load_knowledge_base;
pub use session::{FileSessionStore, MemorySessionStore, SessionRecord, SessionStore};
