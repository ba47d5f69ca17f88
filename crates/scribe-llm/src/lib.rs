//! # scribe-llm
//!
//! Model-provider plumbing: the Anthropic client, retry/backoff wrapper,
//! prompt templates, response extraction, and a scripted mock for tests.
//!
//! ## Crate Position
//!
//! Depends on: scribe-core. Depended on by: scribe-engine (scribe-server's
//! tests also pull in [`MockLlm`]).

#![deny(unsafe_code)]

pub mod anthropic;
pub mod extract;
pub mod mock;
pub mod prompts;
pub mod reliable;

pub use anthropic::AnthropicClient;
pub use mock::{MockLlm, MockReply};
pub use reliable::{ReliableConfig, ReliableLlm};
