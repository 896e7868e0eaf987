//! NuGet version resolution: V3 registration index first, V2 OData fallback.

use reqwest::Client;
use serde_json::Value;

use depgate_core::request::{ResolutionMode, VersionSpec};
use depgate_util::errors::DepGateError;

use crate::cache::CachedCandidates;
use crate::semver_ext;

/// Default NuGet V3 service index.
pub const V3_SERVICE_INDEX: &str = "https://api.nuget.org/v3/index.json";

/// Default NuGet V2 OData base.
pub const V2_BASE: &str = "https://www.nuget.org/api/v2/";

const REGISTRATIONS_RESOURCE: &str = "RegistrationsBaseUrl/3.6.0";
const ACCEPT_JSON: &str = "application/json";

/// Locate the registration base URL in a V3 service index document.
pub fn registration_base(service_index: &Value) -> Option<String> {
    service_index
        .get("resources")?
        .as_array()?
        .iter()
        .find(|resource| resource.get("@type").and_then(Value::as_str) == Some(REGISTRATIONS_RESOURCE))
        .and_then(|resource| resource.get("@id").and_then(Value::as_str))
        .map(|id| id.to_string())
}

/// Extract versions from a V3 registration index document.
pub fn registration_versions(registration: &Value) -> Vec<String> {
    let mut versions = Vec::new();
    let pages = registration
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for page in pages {
        let leaves = page
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for leaf in leaves {
            if let Some(version) = leaf
                .get("catalogEntry")
                .and_then(|entry| entry.get("version"))
                .and_then(Value::as_str)
            {
                versions.push(version.to_string());
            }
        }
    }
    versions
}

async fn fetch_v3_versions(
    client: &Client,
    package_id: &str,
    service_index_url: &str,
) -> Result<Vec<String>, DepGateError> {
    let Some(index) =
        crate::get_json::<Value>(client, service_index_url, Some(ACCEPT_JSON)).await?
    else {
        return Ok(Vec::new());
    };
    let Some(base) = registration_base(&index) else {
        return Ok(Vec::new());
    };
    let url = format!("{base}{}/index.json", package_id.to_lowercase());
    let Some(registration) = crate::get_json::<Value>(client, &url, Some(ACCEPT_JSON)).await?
    else {
        return Ok(Vec::new());
    };
    Ok(registration_versions(&registration))
}

async fn fetch_v2_versions(
    client: &Client,
    package_id: &str,
    v2_base: &str,
) -> Result<Vec<String>, DepGateError> {
    let url = format!(
        "{}/Packages()?$filter=Id eq '{package_id}'&$orderby=Version desc&$select=Version",
        v2_base.trim_end_matches('/'),
    );
    let Some(payload) = crate::get_json::<Value>(client, &url, Some(ACCEPT_JSON)).await? else {
        return Ok(Vec::new());
    };

    // OData JSON nests results under "d"; some servers flatten it.
    let results = payload
        .get("d")
        .and_then(|d| d.get("results"))
        .or_else(|| payload.get("results"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(results
        .iter()
        .filter_map(|item| item.get("Version").and_then(Value::as_str))
        .map(|v| v.to_string())
        .collect())
}

/// Fetch candidates, preferring the V3 registration index.
///
/// Package IDs are case-insensitive; they are lowercased in V3 URLs.
pub async fn fetch_candidates(
    client: &Client,
    identifier: &str,
    service_index_url: &str,
    v2_base: &str,
) -> Result<CachedCandidates, DepGateError> {
    let mut versions = fetch_v3_versions(client, identifier, service_index_url).await?;
    if versions.is_empty() {
        versions = fetch_v2_versions(client, identifier, v2_base).await?;
    }
    Ok(CachedCandidates {
        versions,
        ..Default::default()
    })
}

/// Apply NuGet-flavored semver semantics to select a version.
pub fn pick(
    spec: Option<&VersionSpec>,
    cached: &CachedCandidates,
) -> (Option<String>, usize, Option<String>) {
    let candidates = &cached.versions;
    let count = candidates.len();

    let Some(spec) = spec else {
        if candidates.is_empty() {
            return (None, 0, Some("No versions available".to_string()));
        }
        // Latest excludes prereleases outright for NuGet.
        let best = candidates
            .iter()
            .filter_map(|raw| semver::Version::parse(raw).ok().map(|v| (raw, v)))
            .filter(|(_, v)| v.pre.is_empty())
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(raw, _)| raw.clone());
        return match best {
            Some(version) => (Some(version), count, None),
            None => (None, count, Some("No stable versions available".to_string())),
        };
    };

    match spec.mode {
        ResolutionMode::Exact => {
            if candidates.iter().any(|c| c == &spec.raw) {
                (Some(spec.raw.clone()), count, None)
            } else {
                (None, count, Some(format!("Version {} not found", spec.raw)))
            }
        }
        ResolutionMode::Range | ResolutionMode::Latest => {
            if candidates.is_empty() {
                return (None, 0, Some("No versions available".to_string()));
            }
            let Some(alternatives) = semver_ext::parse_range(&spec.raw) else {
                return (None, count, Some("invalid spec".to_string()));
            };
            match semver_ext::pick_highest_matching(
                candidates,
                &alternatives,
                spec.include_prerelease,
            ) {
                Some(version) => (Some(version), count, None),
                None => (
                    None,
                    count,
                    Some(format!("No versions match spec '{}'", spec.raw)),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cached(list: &[&str]) -> CachedCandidates {
        CachedCandidates {
            versions: list.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn service_index_resource_lookup() {
        let index = json!({
            "resources": [
                {"@id": "https://api.nuget.org/v3/registration5-gz-semver2/", "@type": "RegistrationsBaseUrl/3.6.0"},
                {"@id": "https://other/", "@type": "SearchQueryService"}
            ]
        });
        assert_eq!(
            registration_base(&index).as_deref(),
            Some("https://api.nuget.org/v3/registration5-gz-semver2/")
        );
        assert!(registration_base(&json!({"resources": []})).is_none());
    }

    #[test]
    fn registration_pages_flatten_to_versions() {
        let registration = json!({
            "items": [
                {"items": [
                    {"catalogEntry": {"version": "12.0.1"}},
                    {"catalogEntry": {"version": "13.0.3"}}
                ]},
                {"items": [{"catalogEntry": {"version": "13.0.4-beta1"}}]}
            ]
        });
        assert_eq!(
            registration_versions(&registration),
            vec!["12.0.1", "13.0.3", "13.0.4-beta1"]
        );
    }

    #[test]
    fn latest_excludes_prereleases() {
        let (version, _, _) = pick(None, &cached(&["12.0.1", "13.0.3", "13.0.4-beta1"]));
        assert_eq!(version.as_deref(), Some("13.0.3"));
    }

    #[test]
    fn latest_with_only_prereleases_errors() {
        let (version, _, error) = pick(None, &cached(&["1.0.0-rc.1"]));
        assert!(version.is_none());
        assert_eq!(error.as_deref(), Some("No stable versions available"));
    }

    #[test]
    fn exact_and_range() {
        let exact = VersionSpec {
            raw: "13.0.3".to_string(),
            mode: ResolutionMode::Exact,
            include_prerelease: false,
        };
        let (version, _, _) = pick(Some(&exact), &cached(&["13.0.3"]));
        assert_eq!(version.as_deref(), Some("13.0.3"));

        let range = VersionSpec {
            raw: ">=12.0.0 <13.0.0".to_string(),
            mode: ResolutionMode::Range,
            include_prerelease: false,
        };
        let (version, _, _) = pick(Some(&range), &cached(&["11.0.0", "12.0.3", "13.0.1"]));
        assert_eq!(version.as_deref(), Some("12.0.3"));
    }
}
