//! # scribe-core
//!
//! Foundation types shared by every other scribe crate.
//!
//! - **Branded IDs**: [`ids::RunId`], [`ids::SessionId`] as newtypes
//! - **Run state**: [`state::WorkflowState`] and the artifact types the
//!   workflow accumulates, plus [`state::AgentReply`] for callers
//! - **Provider seam**: [`provider::LlmClient`] trait with
//!   [`provider::CompletionRequest`] / [`provider::Completion`]
//! - **Security**: [`security::SqlGuard`] tenant-isolation checks and repair
//! - **Errors**: [`errors::LlmError`] via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other scribe crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod provider;
pub mod security;
pub mod state;
pub mod tools;

pub use errors::LlmError;
pub use ids::{RunId, SessionId};
pub use security::{IsolationMethod, SqlGuard, TenancyConfig};
pub use state::{
    AgentReply, ExecutionArtifact, ExtractedEntities, NextAction, QueryOutput, QueryRequest,
    Reflection, ResultCheck, Turn, ValidationReport, WorkflowState,
};
pub use tools::{AgentTool, ToolContext, ToolError};
