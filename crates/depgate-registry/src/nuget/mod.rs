//! NuGet registry integration.

pub mod client;
pub mod enrich;
pub mod scan;

/// NuGet V3 service index.
pub const V3_SERVICE_INDEX: &str = "https://api.nuget.org/v3/index.json";

/// NuGet V2 OData base (fallback).
pub const V2_BASE: &str = "https://www.nuget.org/api/v2/";
