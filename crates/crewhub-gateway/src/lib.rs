//! crewhub Gateway - MCP tool server over stdio

pub mod rpc;
pub mod server;
pub mod tools;

pub use rpc::{handle_line, route_rpc, AppContext};
pub use server::{build_context, check_report, serve, serve_stdio, CheckReport};
