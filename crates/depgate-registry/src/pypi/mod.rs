//! PyPI registry integration.

pub mod client;
pub mod enrich;
pub mod lockfile;
pub mod scan;

/// PyPI base URL (JSON and Simple APIs hang off this).
pub const REGISTRY_BASE: &str = "https://pypi.org";

/// pypistats.org endpoint template for recent download stats.
pub const PYPISTATS_RECENT_URL: &str = "https://pypistats.org/api/packages/{package}/recent";
