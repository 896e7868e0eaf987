//! npm registry integration.

pub mod client;
pub mod enrich;
pub mod lockfile;
pub mod scan;

/// npm registry base URL.
pub const REGISTRY_BASE: &str = "https://registry.npmjs.org";

/// npms.io bulk stats endpoint (heuristic scores).
pub const STATS_URL: &str = "https://api.npms.io/v2/package/mget";
