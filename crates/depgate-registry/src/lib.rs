//! Registry clients, enrichers, and source scanners.
//!
//! One module per ecosystem, each with the same internal split the
//! pipeline expects: a `client` that fetches registry metadata and fills
//! the `Package` record, an `enrich` step that discovers and validates the
//! source repository, and a `scan` step that extracts identifiers from
//! manifests and lockfiles on disk.

pub mod http;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod osm;
pub mod pypi;

/// Options shared by all source scanners.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Walk subdirectories for manifests.
    pub recursive: bool,
    /// Ignore lockfiles and return only direct dependencies.
    pub direct_only: bool,
    /// Fail the scan when no lockfile is present.
    pub require_lockfile: bool,
}
