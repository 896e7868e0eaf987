//! Shared utilities for the DepGate supply-chain analyzer.
//!
//! This crate provides cross-cutting concerns used by all other DepGate
//! crates: error types, process exit codes, child-process spawning,
//! secret-command execution, and terminal progress indicators.

pub mod errors;
pub mod process;
pub mod progress;
