//! Policy analysis: facts, rules, the engine, presets, and heuristics.
//!
//! The [`facts::FactBuilder`] projects a `Package` into a flat fact map;
//! [`engine::PolicyEngine`] evaluates a `PolicyConfig` against it through
//! the typed rule evaluators in [`rules`]; [`runner`] owns policy
//! precedence and annotates packages; [`heuristics`] sets the pure risk
//! flags.

pub mod comparators;
pub mod engine;
pub mod facts;
pub mod heuristics;
pub mod presets;
pub mod rules;
pub mod runner;
