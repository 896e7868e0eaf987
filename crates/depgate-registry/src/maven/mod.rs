//! Maven registry integration.

pub mod client;
pub mod discovery;
pub mod enrich;
pub mod scan;

/// Maven Central repository base.
pub const REPO_BASE: &str = "https://repo1.maven.org/maven2";

/// Maven Central search API (existence, timestamps, version counts).
pub const SEARCH_URL: &str = "https://search.maven.org/solrsearch/select";
