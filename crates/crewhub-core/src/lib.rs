//! crewhub Core - Entity documents, protocol types, configuration and error handling

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::{CrewhubConfig, LogConfig, ProviderConfig, ProviderKind};
pub use error::{format_cycle, Error, Result};
pub use protocol::*;
pub use types::*;
