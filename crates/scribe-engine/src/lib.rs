//! # scribe-engine
//!
//! The agentic workflow: planning loop, tools, and the language heuristics
//! around them.
//!
//! - **Runner**: [`Engine`] drives one user turn through the bounded
//!   plan/act loop and folds the run state into an [`scribe_core::AgentReply`]
//! - **Planner**: pure next-step selection from accumulated artifacts
//! - **Tools**: schema introspection, SQL execution, result validation,
//!   invoked through a timing/timeout [`ToolRegistry`]
//! - **Reflection**: classifies execution errors and decides retry vs accept
//! - **Language**: schema-derived vocabulary, first-turn clarification,
//!   follow-up detection and resolution, history digests
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: scribe-core, scribe-llm, scribe-store,
//! scribe-telemetry. Depended on by: scribe-server.

#![deny(unsafe_code)]

pub mod error;
pub mod language;
pub mod planner;
pub mod reflect;
pub mod registry;
pub mod runner;
pub mod tools;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::EngineError;
pub use language::{
    detect_ambiguity, detect_followup, extract_vocabulary, resolve_query, summarize_results,
    EntityExtractor, FollowupSignal, Vocabulary, VocabularyCache,
};
pub use planner::plan;
pub use reflect::{apply_reflection, reflect, CRITICAL_KEYWORDS};
pub use registry::{ToolRegistry, DEFAULT_TOOL_TIMEOUT};
pub use runner::{Engine, EngineConfig};
pub use tools::create_default_registry;
