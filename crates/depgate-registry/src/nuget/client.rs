//! NuGet registry client: V3 registration pages with a V2 OData fallback.

use reqwest::Client;
use serde_json::Value;

use depgate_core::package::{LicenseInfo, Package};
use depgate_core::trust;
use depgate_util::errors::DepGateError;
use depgate_versioning::nuget::registration_base;

use crate::http;

use super::enrich;

const ACCEPT_JSON: &[(&str, &str)] = &[("Accept", "application/json")];

/// Normalized metadata extracted from either API version.
#[derive(Debug, Clone, Default)]
pub struct NugetMetadata {
    pub versions: Vec<String>,
    pub latest_version: Option<String>,
    pub published: Option<String>,
    pub project_url: Option<String>,
    pub repository_url: Option<String>,
    pub license_url: Option<String>,
    pub license: Option<String>,
    pub repository_signed: Option<bool>,
    pub api_version: &'static str,
}

/// Accept the `repository` field as a bare string or a `{url}` object;
/// never dereference blindly.
pub fn repository_url_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
        Value::Object(map) => map
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| u.to_string()),
        _ => None,
    }
}

/// Accept the `license` field as a string or a `{type|expression}` object.
pub fn license_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(license) if !license.trim().is_empty() => {
            Some(license.trim().to_string())
        }
        Value::Object(map) => map
            .get("expression")
            .or_else(|| map.get("type"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string()),
        _ => None,
    }
}

/// Extract normalized metadata from a V3 registration index document.
pub fn metadata_from_registration(registration: &Value) -> NugetMetadata {
    let mut meta = NugetMetadata {
        api_version: "v3",
        ..Default::default()
    };

    let mut latest_entry: Option<Value> = None;
    if let Some(pages) = registration.get("items").and_then(Value::as_array) {
        for page in pages {
            let Some(leaves) = page.get("items").and_then(Value::as_array) else {
                continue;
            };
            for leaf in leaves {
                let Some(entry) = leaf.get("catalogEntry") else {
                    continue;
                };
                if let Some(version) = entry.get("version").and_then(Value::as_str) {
                    meta.versions.push(version.to_string());
                    latest_entry = Some(entry.clone());
                }
            }
        }
    }

    if let Some(entry) = latest_entry {
        meta.latest_version = entry
            .get("version")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        meta.published = entry
            .get("published")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        meta.project_url = entry
            .get("projectUrl")
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
            .map(|u| u.trim().to_string());
        meta.repository_url = repository_url_from(
            entry
                .get("repository")
                .or_else(|| entry.get("repositoryUrl")),
        );
        meta.license_url = entry
            .get("licenseUrl")
            .and_then(Value::as_str)
            .map(|u| u.to_string());
        meta.license = license_from(
            entry
                .get("licenseExpression")
                .or_else(|| entry.get("license")),
        );
    }

    meta.repository_signed = registration
        .get("repositorySignaturesAllRepositorySigned")
        .and_then(Value::as_bool);

    meta
}

/// Extract normalized metadata from a V2 OData JSON payload.
pub fn metadata_from_v2(payload: &Value) -> NugetMetadata {
    let mut meta = NugetMetadata {
        api_version: "v2",
        ..Default::default()
    };

    let results = payload
        .get("d")
        .and_then(|d| d.get("results"))
        .or_else(|| payload.get("results"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for (index, item) in results.iter().enumerate() {
        if let Some(version) = item.get("Version").and_then(Value::as_str) {
            meta.versions.push(version.to_string());
        }
        // Ordered by Version desc: the first row is the newest.
        if index == 0 {
            meta.latest_version = item
                .get("Version")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
            meta.published = item
                .get("Published")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
            meta.project_url = item
                .get("ProjectUrl")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
            meta.license_url = item
                .get("LicenseUrl")
                .and_then(Value::as_str)
                .map(|s| s.to_string());
        }
    }

    meta
}

/// Fetch metadata for one package ID: V3 primary, V2 OData fallback.
pub async fn fetch_metadata(
    client: &Client,
    package_id: &str,
    service_index_url: &str,
    v2_base: &str,
) -> Result<Option<NugetMetadata>, DepGateError> {
    if let Some(index) = http::get_json_lenient(client, service_index_url, ACCEPT_JSON).await {
        if let Some(base) = registration_base(&index) {
            let url = format!("{base}{}/index.json", package_id.to_lowercase());
            if let Some(registration) = http::get_json(client, &url, ACCEPT_JSON).await? {
                let meta = metadata_from_registration(&registration);
                if !meta.versions.is_empty() {
                    return Ok(Some(meta));
                }
            }
        }
    }

    let url = format!(
        "{}/Packages()?$filter=Id eq '{package_id}'&$orderby=Version desc",
        v2_base.trim_end_matches('/'),
    );
    if let Some(payload) = http::get_json_lenient(client, &url, ACCEPT_JSON).await {
        let meta = metadata_from_v2(&payload);
        if !meta.versions.is_empty() {
            return Ok(Some(meta));
        }
    }

    Ok(None)
}

/// Populate registry facts for every package, then enrich.
pub async fn recv_pkg_info(
    client: &Client,
    pkgs: &mut [Package],
    service_index_url: &str,
    v2_base: &str,
) -> Result<(), DepGateError> {
    tracing::info!("nuget registry engaged");
    for pkg in pkgs.iter_mut() {
        let meta = fetch_metadata(client, &pkg.name, service_index_url, v2_base).await?;
        let Some(meta) = meta else {
            pkg.exists = Some(false);
            continue;
        };

        pkg.exists = Some(true);
        pkg.version_count = Some(meta.versions.len());
        if let Some(ts) = trust::epoch_ms_from_iso8601(meta.published.as_deref()) {
            pkg.release_timestamp_ms = Some(ts);
        }
        pkg.registry_signature_present = meta.repository_signed;
        // NuGet exposes no provenance signal; leave it tri-state null.
        pkg.trust_score =
            trust::score_from_boolean_signals(&[meta.repository_signed, pkg.provenance_present]);

        if let Some(license) = &meta.license {
            pkg.license = LicenseInfo {
                id: Some(license.clone()),
                available: Some(true),
                source: Some(if meta.api_version == "v3" {
                    "nuget_catalog_entry".to_string()
                } else {
                    "nuget_odata".to_string()
                }),
                url: meta.license_url.clone(),
            };
        } else if let Some(url) = &meta.license_url {
            pkg.license.url = Some(url.clone());
            pkg.license.available = Some(false);
        }

        enrich::enrich_with_repo(client, pkg, &meta).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repository_field_accepts_string_and_object() {
        assert_eq!(
            repository_url_from(Some(&json!("https://github.com/o/r"))).as_deref(),
            Some("https://github.com/o/r")
        );
        assert_eq!(
            repository_url_from(Some(&json!({"url": "https://github.com/o/r", "type": "git"})))
                .as_deref(),
            Some("https://github.com/o/r")
        );
        assert_eq!(repository_url_from(Some(&json!({"type": "git"}))), None);
        assert_eq!(repository_url_from(Some(&json!(42))), None);
        assert_eq!(repository_url_from(None), None);
    }

    #[test]
    fn license_field_accepts_string_and_object() {
        assert_eq!(license_from(Some(&json!("MIT"))).as_deref(), Some("MIT"));
        assert_eq!(
            license_from(Some(&json!({"expression": "Apache-2.0"}))).as_deref(),
            Some("Apache-2.0")
        );
        assert_eq!(
            license_from(Some(&json!({"type": "BSD-3-Clause"}))).as_deref(),
            Some("BSD-3-Clause")
        );
    }

    #[test]
    fn registration_metadata_extraction() {
        let registration = json!({
            "repositorySignaturesAllRepositorySigned": true,
            "items": [{
                "items": [
                    {"catalogEntry": {"version": "12.0.1", "published": "2019-01-01T00:00:00Z"}},
                    {"catalogEntry": {
                        "version": "13.0.3",
                        "published": "2023-03-08T00:00:00Z",
                        "projectUrl": "https://www.newtonsoft.com/json",
                        "repository": {"url": "https://github.com/JamesNK/Newtonsoft.Json"},
                        "licenseExpression": "MIT"
                    }}
                ]
            }]
        });
        let meta = metadata_from_registration(&registration);
        assert_eq!(meta.versions, vec!["12.0.1", "13.0.3"]);
        assert_eq!(meta.latest_version.as_deref(), Some("13.0.3"));
        assert_eq!(
            meta.repository_url.as_deref(),
            Some("https://github.com/JamesNK/Newtonsoft.Json")
        );
        assert_eq!(meta.license.as_deref(), Some("MIT"));
        assert_eq!(meta.repository_signed, Some(true));
        assert_eq!(meta.api_version, "v3");
    }

    #[test]
    fn v2_metadata_extraction() {
        let payload = json!({
            "d": {"results": [
                {"Version": "13.0.3", "ProjectUrl": "https://example.com", "Published": "2023-03-08T00:00:00Z"},
                {"Version": "12.0.1"}
            ]}
        });
        let meta = metadata_from_v2(&payload);
        assert_eq!(meta.versions.len(), 2);
        assert_eq!(meta.latest_version.as_deref(), Some("13.0.3"));
        assert_eq!(meta.project_url.as_deref(), Some("https://example.com"));
        assert_eq!(meta.api_version, "v2");
    }
}
