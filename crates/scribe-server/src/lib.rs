//! # scribe-server
//!
//! HTTP surface for the query engine:
//!
//! - **Routes**: `POST /query`, `GET /health`, `GET /schema`,
//!   `GET /datasets`, `DELETE /sessions/{id}`
//! - **Server**: Axum router construction and lifecycle
//!
//! ## Crate Position
//!
//! Outermost layer. Depends on: scribe-core, scribe-engine, scribe-store,
//! scribe-telemetry. Depended on by: the `scribe` binary.

#![deny(unsafe_code)]

pub mod handlers;
pub mod server;

#[cfg(test)]
pub(crate) mod testutil;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
