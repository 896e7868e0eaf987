//! PyPI registry client: JSON API facts, Simple-API trust signals, and
//! pypistats weekly downloads.

use reqwest::Client;
use serde_json::Value;

use depgate_core::package::{LicenseInfo, Package};
use depgate_core::request::normalize_pypi_name;
use depgate_core::trust;
use depgate_util::errors::DepGateError;

use crate::http;

use super::enrich;

const SIMPLE_ACCEPT: &str = "application/vnd.pypi.simple.v1+json";

/// Check every package against PyPI and enrich the records.
pub async fn recv_pkg_info(
    client: &Client,
    pkgs: &mut [Package],
    base_url: &str,
) -> Result<(), DepGateError> {
    tracing::info!("PyPI registry engaged");
    for pkg in pkgs.iter_mut() {
        fetch_one(client, pkg, base_url).await?;
    }
    Ok(())
}

async fn fetch_one(
    client: &Client,
    pkg: &mut Package,
    base_url: &str,
) -> Result<(), DepGateError> {
    let normalized = normalize_pypi_name(&pkg.name);
    let url = format!("{}/pypi/{normalized}/json", base_url.trim_end_matches('/'));

    let Some(document) = http::get_json(client, &url, &[]).await? else {
        pkg.exists = Some(false);
        return Ok(());
    };
    let Some(info) = document.get("info").filter(|i| !i.is_null()) else {
        pkg.exists = Some(false);
        return Ok(());
    };

    pkg.exists = Some(true);

    let releases = document
        .get("releases")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    pkg.version_count = Some(releases.len());

    let latest = info
        .get("version")
        .and_then(Value::as_str)
        .map(|s| s.to_string());
    let selected = pkg
        .resolved_version
        .clone()
        .filter(|v| releases.contains_key(v))
        .or(latest);
    let Some(selected) = selected else {
        return Ok(());
    };

    if let Some(ts) = release_timestamp_ms(releases.get(&selected)) {
        pkg.release_timestamp_ms = Some(ts);
    }

    // Previous release ordered by upload time for regression tracking.
    let ordered = ordered_release_versions(&releases);
    pkg.previous_release_version = previous_of(&ordered, &selected);

    extract_license(pkg, info);
    let match_version = pkg.match_version(&selected);
    enrich::enrich_with_repo(client, pkg, info, &match_version).await;

    pkg.weekly_downloads = fetch_weekly_downloads(client, &normalized).await;

    apply_trust_signals(client, pkg, base_url, &normalized, &selected, &releases).await;

    Ok(())
}

/// Earliest upload timestamp across a release's files.
fn release_timestamp_ms(files: Option<&Value>) -> Option<i64> {
    let files = files?.as_array()?;
    files
        .iter()
        .filter_map(|file| {
            let iso = file
                .get("upload_time_iso_8601")
                .or_else(|| file.get("upload_time"))
                .and_then(Value::as_str);
            trust::epoch_ms_from_iso8601(iso)
        })
        .min()
}

/// Release versions ordered oldest to newest by upload timestamp.
fn ordered_release_versions(releases: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut pairs: Vec<(i64, String)> = releases
        .iter()
        .filter_map(|(version, files)| {
            release_timestamp_ms(Some(files)).map(|ts| (ts, version.clone()))
        })
        .collect();
    if pairs.is_empty() {
        return releases.keys().cloned().collect();
    }
    pairs.sort();
    pairs.into_iter().map(|(_, version)| version).collect()
}

fn previous_of(ordered: &[String], selected: &str) -> Option<String> {
    if let Some(idx) = ordered.iter().position(|v| v == selected) {
        return if idx > 0 {
            Some(ordered[idx - 1].clone())
        } else {
            None
        };
    }
    if ordered.len() >= 2 {
        return Some(ordered[ordered.len() - 2].clone());
    }
    None
}

fn extract_license(pkg: &mut Package, info: &Value) {
    let license_field = info
        .get("license")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 100);
    if let Some(id) = license_field {
        pkg.license = LicenseInfo {
            id: Some(id.to_string()),
            available: Some(true),
            source: Some("pypi_info_license".to_string()),
            url: None,
        };
        return;
    }

    // Fall back to trove classifiers: "License :: OSI Approved :: MIT License".
    let classifier = info
        .get("classifiers")
        .and_then(Value::as_array)
        .and_then(|classifiers| {
            classifiers
                .iter()
                .filter_map(Value::as_str)
                .filter(|c| c.starts_with("License ::"))
                .filter_map(|c| c.rsplit("::").next())
                .map(str::trim)
                .find(|c| !c.is_empty() && *c != "OSI Approved")
        });
    if let Some(id) = classifier {
        pkg.license = LicenseInfo {
            id: Some(id.to_string()),
            available: Some(true),
            source: Some("pypi_classifiers".to_string()),
            url: None,
        };
    }
}

async fn fetch_weekly_downloads(client: &Client, normalized: &str) -> Option<i64> {
    let url = super::PYPISTATS_RECENT_URL.replace("{package}", normalized);
    let stats = http::get_json_lenient(client, &url, &[]).await?;
    stats.get("data")?.get("last_week")?.as_i64()
}

/// Signature and provenance presence from the Simple API, with the
/// Warehouse `has_sig` field as the legacy signature fallback.
async fn apply_trust_signals(
    client: &Client,
    pkg: &mut Package,
    base_url: &str,
    normalized: &str,
    selected: &str,
    releases: &serde_json::Map<String, Value>,
) {
    let simple_url = format!("{}/simple/{normalized}/", base_url.trim_end_matches('/'));
    let simple = http::get_json_lenient(client, &simple_url, &[("Accept", SIMPLE_ACCEPT)]).await;

    let (mut cur_sig, cur_prov, cur_prov_url) = simple_trust(simple.as_ref(), selected);
    let previous = pkg.previous_release_version.clone();
    let (mut prev_sig, prev_prov, _) = match &previous {
        Some(version) => simple_trust(simple.as_ref(), version),
        None => (None, None, None),
    };

    if cur_sig.is_none() {
        cur_sig = legacy_has_sig(releases, selected);
    }
    if let Some(version) = &previous {
        if prev_sig.is_none() {
            prev_sig = legacy_has_sig(releases, version);
        }
    }

    pkg.registry_signature_present = cur_sig;
    pkg.previous_registry_signature_present = prev_sig;
    pkg.provenance_present = cur_prov;
    pkg.previous_provenance_present = prev_prov;
    if let Some(url) = cur_prov_url {
        pkg.provenance_url = Some(url);
        pkg.provenance
            .insert("provenance_source".to_string(), "pypi_simple_api".to_string());
    }
    pkg.registry_signature_regressed = trust::regressed(cur_sig, prev_sig);
    pkg.provenance_regressed = trust::regressed(cur_prov, prev_prov);
    pkg.trust_score = trust::score_from_boolean_signals(&[cur_sig, cur_prov]);
    pkg.previous_trust_score = trust::score_from_boolean_signals(&[prev_sig, prev_prov]);
    let (delta, decreased) = trust::score_delta(pkg.trust_score, pkg.previous_trust_score, 0.0);
    pkg.trust_score_delta = delta;
    pkg.trust_score_decreased = decreased;
}

/// `(signature_present, provenance_present, provenance_url)` for a version
/// from the Simple API JSON; all null when the version has no files there.
fn simple_trust(
    simple: Option<&Value>,
    version: &str,
) -> (Option<bool>, Option<bool>, Option<String>) {
    let Some(files) = simple.and_then(|s| s.get("files")).and_then(Value::as_array) else {
        return (None, None, None);
    };

    let version_files: Vec<&Value> = files
        .iter()
        .filter(|file| {
            file.get("version").and_then(Value::as_str) == Some(version)
        })
        .collect();
    if version_files.is_empty() {
        return (None, None, None);
    }

    let mut has_signature = false;
    let mut has_provenance = false;
    let mut provenance_url = None;
    for file in version_files {
        if file
            .get("gpg-sig")
            .map(truthy)
            .unwrap_or(false)
        {
            has_signature = true;
        }
        match file.get("provenance") {
            Some(Value::String(url)) if !url.trim().is_empty() => {
                has_provenance = true;
                provenance_url.get_or_insert_with(|| url.trim().to_string());
            }
            Some(Value::Object(map)) => {
                has_provenance = true;
                if provenance_url.is_none() {
                    if let Some(url) = map.get("url").and_then(Value::as_str) {
                        provenance_url = Some(url.trim().to_string());
                    }
                }
            }
            Some(Value::Bool(true)) => has_provenance = true,
            _ => {}
        }
    }
    (Some(has_signature), Some(has_provenance), provenance_url)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn legacy_has_sig(
    releases: &serde_json::Map<String, Value>,
    version: &str,
) -> Option<bool> {
    let files = releases.get(version)?.as_array()?;
    if files.is_empty() {
        return None;
    }
    Some(
        files
            .iter()
            .any(|file| file.get("has_sig").map(truthy).unwrap_or(false)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn earliest_upload_wins() {
        let files = json!([
            {"upload_time_iso_8601": "2023-06-02T00:00:00Z"},
            {"upload_time_iso_8601": "2023-06-01T00:00:00Z"}
        ]);
        let ts = release_timestamp_ms(Some(&files)).unwrap();
        assert_eq!(
            ts,
            trust::epoch_ms_from_iso8601(Some("2023-06-01T00:00:00Z")).unwrap()
        );
    }

    #[test]
    fn release_ordering_by_upload_time() {
        let releases: serde_json::Map<String, Value> = serde_json::from_value(json!({
            "1.0": [{"upload_time_iso_8601": "2020-01-01T00:00:00Z"}],
            "2.0": [{"upload_time_iso_8601": "2021-01-01T00:00:00Z"}],
            "1.5": [{"upload_time_iso_8601": "2020-06-01T00:00:00Z"}]
        }))
        .unwrap();
        let ordered = ordered_release_versions(&releases);
        assert_eq!(ordered, vec!["1.0", "1.5", "2.0"]);
        assert_eq!(previous_of(&ordered, "2.0").as_deref(), Some("1.5"));
    }

    #[test]
    fn license_from_info_then_classifiers() {
        let mut pkg = Package::new("requests", depgate_core::ecosystem::Ecosystem::Pypi);
        extract_license(&mut pkg, &json!({"license": "Apache-2.0"}));
        assert_eq!(pkg.license.id.as_deref(), Some("Apache-2.0"));
        assert_eq!(pkg.license.source.as_deref(), Some("pypi_info_license"));

        let mut pkg = Package::new("requests", depgate_core::ecosystem::Ecosystem::Pypi);
        extract_license(
            &mut pkg,
            &json!({
                "license": "",
                "classifiers": ["License :: OSI Approved :: MIT License"]
            }),
        );
        assert_eq!(pkg.license.id.as_deref(), Some("MIT License"));
        assert_eq!(pkg.license.source.as_deref(), Some("pypi_classifiers"));
    }

    #[test]
    fn simple_api_trust_extraction() {
        let simple = json!({
            "files": [
                {"version": "1.0", "gpg-sig": true, "provenance": {"url": "https://pypi.org/prov/1"}},
                {"version": "0.9", "gpg-sig": false}
            ]
        });
        let (sig, prov, url) = simple_trust(Some(&simple), "1.0");
        assert_eq!(sig, Some(true));
        assert_eq!(prov, Some(true));
        assert_eq!(url.as_deref(), Some("https://pypi.org/prov/1"));

        let (sig, prov, url) = simple_trust(Some(&simple), "0.9");
        assert_eq!(sig, Some(false));
        assert_eq!(prov, Some(false));
        assert!(url.is_none());

        assert_eq!(simple_trust(Some(&simple), "9.9"), (None, None, None));
        assert_eq!(simple_trust(None, "1.0"), (None, None, None));
    }

    #[test]
    fn legacy_signature_fallback() {
        let releases: serde_json::Map<String, Value> = serde_json::from_value(json!({
            "1.0": [{"has_sig": true}],
            "2.0": [{"has_sig": false}]
        }))
        .unwrap();
        assert_eq!(legacy_has_sig(&releases, "1.0"), Some(true));
        assert_eq!(legacy_has_sig(&releases, "2.0"), Some(false));
        assert_eq!(legacy_has_sig(&releases, "3.0"), None);
    }
}
