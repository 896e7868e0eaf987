//! npm version resolution from registry packuments.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::Deserialize;

use depgate_core::request::{ResolutionMode, VersionSpec};
use depgate_util::errors::DepGateError;

use crate::cache::CachedCandidates;
use crate::semver_ext;

/// Default npm registry base.
pub const REGISTRY_BASE: &str = "https://registry.npmjs.org";

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: BTreeMap<String, serde_json::Value>,
}

/// Fetch the candidate versions for a package from its packument.
pub async fn fetch_candidates(
    client: &Client,
    identifier: &str,
    base_url: &str,
) -> Result<CachedCandidates, DepGateError> {
    let url = format!("{}/{identifier}", base_url.trim_end_matches('/'));
    let packument: Option<Packument> = crate::get_json(client, &url, None).await?;
    Ok(CachedCandidates {
        versions: packument
            .map(|p| p.versions.into_keys().collect())
            .unwrap_or_default(),
        ..Default::default()
    })
}

/// Apply npm semver semantics to select a version.
pub fn pick(
    spec: Option<&VersionSpec>,
    cached: &CachedCandidates,
) -> (Option<String>, usize, Option<String>) {
    let candidates = &cached.versions;
    let count = candidates.len();

    let Some(spec) = spec else {
        return match semver_ext::pick_highest(candidates) {
            Some(version) => (Some(version), count, None),
            None if count == 0 => (None, 0, Some("No versions available".to_string())),
            None => (None, count, Some("No valid semantic versions found".to_string())),
        };
    };

    match spec.mode {
        ResolutionMode::Exact => pick_exact(&spec.raw, candidates),
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

fn pick_exact(version: &str, candidates: &[String]) -> (Option<String>, usize, Option<String>) {
    if candidates.iter().any(|c| c == version) {
        (Some(version.to_string()), candidates.len(), None)
    } else {
        (
            None,
            candidates.len(),
            Some(format!("Version {version} not found")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(list: &[&str]) -> CachedCandidates {
        CachedCandidates {
            versions: list.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn range_spec(raw: &str, include_prerelease: bool) -> VersionSpec {
        VersionSpec {
            raw: raw.to_string(),
            mode: ResolutionMode::Range,
            include_prerelease,
        }
    }

    #[test]
    fn latest_picks_highest_stable() {
        let (version, count, error) =
            pick(None, &cached(&["1.0.0", "2.1.0", "2.2.0-beta.1"]));
        assert_eq!(version.as_deref(), Some("2.1.0"));
        assert_eq!(count, 3);
        assert!(error.is_none());
    }

    #[test]
    fn empty_candidates_report_no_versions() {
        let (version, count, error) = pick(None, &cached(&[]));
        assert!(version.is_none());
        assert_eq!(count, 0);
        assert_eq!(error.as_deref(), Some("No versions available"));
    }

    #[test]
    fn exact_membership() {
        let spec = VersionSpec {
            raw: "1.0.0".to_string(),
            mode: ResolutionMode::Exact,
            include_prerelease: false,
        };
        let (version, _, error) = pick(Some(&spec), &cached(&["1.0.0", "1.0.1"]));
        assert_eq!(version.as_deref(), Some("1.0.0"));
        assert!(error.is_none());

        let spec = VersionSpec {
            raw: "9.9.9".to_string(),
            mode: ResolutionMode::Exact,
            include_prerelease: false,
        };
        let (version, _, error) = pick(Some(&spec), &cached(&["1.0.0"]));
        assert!(version.is_none());
        assert_eq!(error.as_deref(), Some("Version 9.9.9 not found"));
    }

    #[test]
    fn caret_range_picks_highest_in_major() {
        let spec = range_spec("^1.2.0", false);
        let (version, _, _) = pick(Some(&spec), &cached(&["1.2.0", "1.9.3", "2.0.0"]));
        assert_eq!(version.as_deref(), Some("1.9.3"));
    }

    #[test]
    fn x_range_picks_within_minor() {
        let spec = range_spec("1.2.x", false);
        let (version, _, _) = pick(Some(&spec), &cached(&["1.2.0", "1.2.7", "1.3.0"]));
        assert_eq!(version.as_deref(), Some("1.2.7"));
    }

    #[test]
    fn invalid_spec_error_is_stable() {
        let spec = range_spec("not a ^ valid || spec @", false);
        let (version, _, error) = pick(Some(&spec), &cached(&["1.0.0"]));
        assert!(version.is_none());
        assert_eq!(error.as_deref(), Some("invalid spec"));
    }

    #[test]
    fn prerelease_range_requires_flag() {
        let spec = range_spec(">=2.0.0-alpha", true);
        let (version, _, _) = pick(Some(&spec), &cached(&["1.0.0", "2.0.0-beta.2"]));
        assert_eq!(version.as_deref(), Some("2.0.0-beta.2"));
    }
}
