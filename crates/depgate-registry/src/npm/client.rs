//! npm registry client: per-package packument details and bulk stats.

use reqwest::Client;
use serde_json::{json, Value};

use depgate_core::package::{LicenseInfo, Package};
use depgate_core::trust;
use depgate_util::errors::DepGateError;

use crate::http;

use super::enrich;

const PACKUMENT_ACCEPT: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*";

/// Populate registry facts for every package, then enrich with repository
/// discovery. Bulk heuristic scores come from npms.io afterwards.
pub async fn recv_pkg_info(
    client: &Client,
    pkgs: &mut [Package],
    fetch_details: bool,
    details_base: &str,
    stats_url: &str,
) -> Result<(), DepGateError> {
    tracing::info!("npm registry engaged");

    if fetch_details {
        for pkg in pkgs.iter_mut() {
            get_package_details(client, pkg, details_base).await?;
        }
    }

    fetch_bulk_stats(client, pkgs, stats_url).await;
    Ok(())
}

/// Fetch one packument and extract facts plus repository candidates.
pub async fn get_package_details(
    client: &Client,
    pkg: &mut Package,
    base_url: &str,
) -> Result<(), DepGateError> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), pkg.name);
    tracing::debug!(package = %pkg.name, "fetching packument");

    let Some(packument) = http::get_json(client, &url, &[("Accept", PACKUMENT_ACCEPT)]).await?
    else {
        pkg.exists = Some(false);
        return Ok(());
    };

    let versions = packument
        .get("versions")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    pkg.exists = Some(true);
    pkg.version_count = Some(versions.len());

    let latest = packument
        .get("dist-tags")
        .and_then(|tags| tags.get("latest"))
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let selected = pkg
        .resolved_version
        .clone()
        .filter(|v| versions.contains_key(v))
        .or(latest);
    let Some(selected) = selected else {
        return Ok(());
    };

    let time_map = packument
        .get("time")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(ts) = time_map
        .get(&selected)
        .and_then(Value::as_str)
        .and_then(|s| trust::epoch_ms_from_iso8601(Some(s)))
    {
        pkg.release_timestamp_ms = Some(ts);
    }

    // Previous release by publish time, falling back to semver order.
    let ordered = ordered_versions(&versions, &time_map);
    pkg.previous_release_version = previous_of(&ordered, &selected);

    extract_license(pkg, &packument, versions.get(&selected));
    let previous = pkg.previous_release_version.clone();
    extract_trust_signals(pkg, &versions, &selected, previous);

    let match_version = pkg.match_version(&selected);
    enrich::enrich_with_repo(client, pkg, &packument, &selected, &match_version).await;
    Ok(())
}

/// Versions ordered oldest to newest by the packument `time` map; entries
/// without a timestamp sort by semver at the front.
fn ordered_versions(
    versions: &serde_json::Map<String, Value>,
    time_map: &serde_json::Map<String, Value>,
) -> Vec<String> {
    let mut timed: Vec<(Option<i64>, semver::Version, String)> = versions
        .keys()
        .map(|v| {
            let ts = time_map
                .get(v)
                .and_then(Value::as_str)
                .and_then(|s| trust::epoch_ms_from_iso8601(Some(s)));
            let parsed = semver::Version::parse(v)
                .unwrap_or_else(|_| semver::Version::new(0, 0, 0));
            (ts, parsed, v.clone())
        })
        .collect();
    timed.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.1.cmp(&b.1),
    });
    timed.into_iter().map(|(_, _, v)| v).collect()
}

fn previous_of(ordered: &[String], selected: &str) -> Option<String> {
    if let Some(idx) = ordered.iter().position(|v| v == selected) {
        if idx > 0 {
            return Some(ordered[idx - 1].clone());
        }
        return None;
    }
    if ordered.len() >= 2 {
        return Some(ordered[ordered.len() - 2].clone());
    }
    None
}

fn extract_license(pkg: &mut Package, packument: &Value, version_info: Option<&Value>) {
    let license_value = version_info
        .and_then(|v| v.get("license"))
        .or_else(|| packument.get("license"));
    let id = match license_value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Object(map)) => map
            .get("type")
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        _ => None,
    };
    if let Some(id) = id {
        pkg.license = LicenseInfo {
            id: Some(id),
            available: Some(true),
            source: Some("npm_license_field".to_string()),
            url: None,
        };
    }
}

/// Signature and provenance presence for the selected version, compared
/// against the previous release for regression tracking.
fn extract_trust_signals(
    pkg: &mut Package,
    versions: &serde_json::Map<String, Value>,
    selected: &str,
    previous: Option<String>,
) {
    let current = version_signals(versions.get(selected));
    let prior = previous
        .as_deref()
        .map(|v| version_signals(versions.get(v)))
        .unwrap_or((None, None));

    pkg.registry_signature_present = current.0;
    pkg.provenance_present = current.1;
    pkg.previous_registry_signature_present = prior.0;
    pkg.previous_provenance_present = prior.1;
    pkg.registry_signature_regressed = trust::regressed(current.0, prior.0);
    pkg.provenance_regressed = trust::regressed(current.1, prior.1);
    pkg.trust_score = trust::score_from_boolean_signals(&[current.0, current.1]);
    pkg.previous_trust_score = trust::score_from_boolean_signals(&[prior.0, prior.1]);
    let (delta, decreased) = trust::score_delta(pkg.trust_score, pkg.previous_trust_score, 0.0);
    pkg.trust_score_delta = delta;
    pkg.trust_score_decreased = decreased;
}

/// `(registry_signature_present, provenance_present)` for one version
/// object; both null when the version is unknown.
fn version_signals(version_info: Option<&Value>) -> (Option<bool>, Option<bool>) {
    let Some(info) = version_info else {
        return (None, None);
    };
    let dist = info.get("dist");

    let signatures = dist
        .and_then(|d| d.get("signatures"))
        .and_then(Value::as_array)
        .map(|sigs| !sigs.is_empty());
    let npm_signature = dist
        .and_then(|d| d.get("npm-signature"))
        .and_then(Value::as_str)
        .map(|s| !s.trim().is_empty());
    let signature_present = match (signatures, npm_signature) {
        (None, None) => Some(false),
        (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
    };

    let provenance_present = [
        dist.and_then(|d| d.get("attestations")),
        info.get("attestations"),
        dist.and_then(|d| d.get("provenance")),
        info.get("provenance"),
    ]
    .iter()
    .any(|signal| match signal {
        Some(Value::Null) | None => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    });

    (signature_present, Some(provenance_present))
}

/// Bulk stats from npms.io: the `score.final` heuristic plus a timestamp
/// fallback. Best-effort: a stats outage never fails the batch.
async fn fetch_bulk_stats(client: &Client, pkgs: &mut [Package], stats_url: &str) {
    if pkgs.is_empty() {
        return;
    }
    let names: Vec<&str> = pkgs.iter().map(|p| p.name.as_str()).collect();
    let payload = json!(names);

    let stats = match http::post_json(client, stats_url, &payload).await {
        Ok(Some(stats)) => stats,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "npms.io stats unavailable, skipping scores");
            return;
        }
    };

    for pkg in pkgs.iter_mut() {
        match stats.get(&pkg.name) {
            Some(info) => {
                if pkg.exists.is_none() {
                    pkg.exists = Some(true);
                }
                pkg.heuristic_score = info
                    .get("score")
                    .and_then(|s| s.get("final"))
                    .and_then(Value::as_f64);
                if pkg.release_timestamp_ms.is_none() {
                    pkg.release_timestamp_ms = info
                        .get("collected")
                        .and_then(|c| c.get("metadata"))
                        .and_then(|m| m.get("date"))
                        .and_then(Value::as_str)
                        .and_then(|s| trust::epoch_ms_from_iso8601(Some(s)));
                }
            }
            None => {
                // A package with a resolved version necessarily exists on
                // the registry; only otherwise does stats absence count.
                if pkg.exists.is_none() {
                    pkg.exists = Some(pkg.resolved_version.is_some());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions_map(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn ordering_prefers_time_map() {
        let versions = versions_map(&[
            ("1.0.0", json!({})),
            ("1.1.0", json!({})),
            ("0.9.0", json!({})),
        ]);
        let time = versions_map(&[
            ("1.0.0", json!("2020-01-01T00:00:00Z")),
            ("1.1.0", json!("2021-01-01T00:00:00Z")),
            ("0.9.0", json!("2022-01-01T00:00:00Z")),
        ]);
        // 0.9.0 was (re)published last, so it sorts newest.
        let ordered = ordered_versions(&versions, &time);
        assert_eq!(ordered, vec!["1.0.0", "1.1.0", "0.9.0"]);
        assert_eq!(previous_of(&ordered, "0.9.0").as_deref(), Some("1.1.0"));
        assert_eq!(previous_of(&ordered, "1.0.0"), None);
    }

    #[test]
    fn signature_signals() {
        let with_sig = json!({"dist": {"signatures": [{"keyid": "k"}]}});
        assert_eq!(version_signals(Some(&with_sig)).0, Some(true));

        let legacy_sig = json!({"dist": {"npm-signature": "-----BEGIN..."}});
        assert_eq!(version_signals(Some(&legacy_sig)).0, Some(true));

        let bare = json!({"dist": {}});
        assert_eq!(version_signals(Some(&bare)).0, Some(false));

        assert_eq!(version_signals(None), (None, None));
    }

    #[test]
    fn provenance_signals() {
        let attested = json!({"dist": {"attestations": {"url": "https://npm/att"}}});
        assert_eq!(version_signals(Some(&attested)).1, Some(true));

        let provenance = json!({"provenance": {"predicateType": "slsa"}});
        assert_eq!(version_signals(Some(&provenance)).1, Some(true));

        let none = json!({"dist": {}});
        assert_eq!(version_signals(Some(&none)).1, Some(false));
    }

    #[test]
    fn license_string_and_object_forms() {
        let mut pkg = Package::new("x", depgate_core::ecosystem::Ecosystem::Npm);
        extract_license(&mut pkg, &json!({"license": "MIT"}), None);
        assert_eq!(pkg.license.id.as_deref(), Some("MIT"));
        assert_eq!(pkg.license.available, Some(true));

        let mut pkg = Package::new("x", depgate_core::ecosystem::Ecosystem::Npm);
        let version_info = json!({"license": {"type": "Apache-2.0"}});
        extract_license(&mut pkg, &json!({}), Some(&version_info));
        assert_eq!(pkg.license.id.as_deref(), Some("Apache-2.0"));
    }
}
