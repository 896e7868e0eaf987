//! Core data types for the DepGate supply-chain analyzer.
//!
//! Everything downstream of input parsing and upstream of serialization
//! lives here: the closed [`ecosystem::Ecosystem`] set, the central mutable
//! [`package::Package`] record, policy configuration and decision types,
//! version-request models with token parsing, trust-signal arithmetic, and
//! the runtime [`config::Config`] value object.

pub mod config;
pub mod ecosystem;
pub mod package;
pub mod policy;
pub mod request;
pub mod trust;
