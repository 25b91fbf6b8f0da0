//! # Questline
//!
//! The binary side of Questline: HTTP API, CLI and catalog loading around
//! the synchronous `questline-core` engine.
//!
//! Exposed as a library so integration tests can build the router.

pub mod api;
pub mod catalog;
pub mod cli;
