//! Shared utilities for the Stormline workspace.
//!
//! Intentionally lightweight so every crate can depend on it without pulling
//! in heavy transitive costs. Currently this is the centralised tracing
//! bootstrap; see [`observability`].

pub mod observability;
