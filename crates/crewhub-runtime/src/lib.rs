//! crewhub Runtime - Team dependency graph, lifecycle manager and execution gateway

pub mod execution;
pub mod graph;
pub mod lifecycle;
pub mod order;
pub mod prompt;
pub mod registry;

pub use execution::{ExecutionGateway, RunOutcome, RunRequest};
pub use graph::{ReverseIndex, TeamGraph};
pub use lifecycle::{AffectedTeam, EntitySummary, MutationReport, TeamManager, TeamSummary};
pub use order::{peel_cycles, topo_order};
pub use registry::{Member, ResolvedAgent, ResolvedTeam, RuntimeRegistry, TeamStatus};
