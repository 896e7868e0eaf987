//! PyPI version resolution via the JSON API and PEP 440 semantics.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::Deserialize;

use depgate_core::request::{normalize_pypi_name, ResolutionMode, VersionSpec};
use depgate_util::errors::DepGateError;

use crate::cache::CachedCandidates;
use crate::pep440::{parse_specifiers, specifiers_match, Pep440Version};

/// Default PyPI base.
pub const REGISTRY_BASE: &str = "https://pypi.org";

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    #[serde(default)]
    releases: BTreeMap<String, serde_json::Value>,
}

/// Fetch the release map for a package; the name is PEP-503 normalized
/// before it reaches the registry URL.
pub async fn fetch_candidates(
    client: &Client,
    identifier: &str,
    base_url: &str,
) -> Result<CachedCandidates, DepGateError> {
    let name = normalize_pypi_name(identifier);
    let url = format!("{}/pypi/{name}/json", base_url.trim_end_matches('/'));
    let document: Option<ProjectDocument> = crate::get_json(client, &url, None).await?;
    Ok(CachedCandidates {
        versions: document
            .map(|d| d.releases.into_keys().collect())
            .unwrap_or_default(),
        ..Default::default()
    })
}

/// Apply PEP 440 semantics to select a version.
pub fn pick(
    spec: Option<&VersionSpec>,
    cached: &CachedCandidates,
) -> (Option<String>, usize, Option<String>) {
    let candidates = &cached.versions;
    let count = candidates.len();

    let Some(spec) = spec else {
        return pick_latest(candidates);
    };

    match spec.mode {
        ResolutionMode::Exact => pick_exact(&spec.raw, candidates),
        ResolutionMode::Range | ResolutionMode::Latest => pick_range(&spec.raw, candidates),
    }
}

fn pick_latest(candidates: &[String]) -> (Option<String>, usize, Option<String>) {
    if candidates.is_empty() {
        return (None, 0, Some("No versions available".to_string()));
    }
    let parsed: Vec<(&String, Pep440Version)> = candidates
        .iter()
        .filter_map(|raw| Pep440Version::parse(raw).map(|v| (raw, v)))
        .collect();
    if parsed.is_empty() {
        return (
            None,
            candidates.len(),
            Some("No valid versions found".to_string()),
        );
    }
    let best = parsed
        .iter()
        .filter(|(_, v)| !v.is_prerelease())
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .or_else(|| parsed.iter().max_by(|(_, a), (_, b)| a.cmp(b)));
    (
        best.map(|(raw, _)| (*raw).clone()),
        candidates.len(),
        None,
    )
}

fn pick_exact(version: &str, candidates: &[String]) -> (Option<String>, usize, Option<String>) {
    if candidates.iter().any(|c| c == version) {
        return (Some(version.to_string()), candidates.len(), None);
    }
    // "1.0" and "1.0.0" are the same PEP 440 version; accept a candidate
    // that compares equal even when the strings differ.
    if let Some(wanted) = Pep440Version::parse(version) {
        for candidate in candidates {
            if Pep440Version::parse(candidate)
                .is_some_and(|parsed| parsed.cmp(&wanted) == std::cmp::Ordering::Equal)
            {
                return (Some(candidate.clone()), candidates.len(), None);
            }
        }
    }
    (
        None,
        candidates.len(),
        Some(format!("Version {version} not found")),
    )
}

fn pick_range(raw: &str, candidates: &[String]) -> (Option<String>, usize, Option<String>) {
    let count = candidates.len();
    if candidates.is_empty() {
        return (None, 0, Some("No versions available".to_string()));
    }
    let Some(specifiers) = parse_specifiers(raw) else {
        return (None, count, Some("invalid spec".to_string()));
    };

    // PEP 440: pre-releases only participate when the spec names one.
    let allow_prerelease = raw_mentions_prerelease(raw);

    let best = candidates
        .iter()
        .filter_map(|c| Pep440Version::parse(c).map(|v| (c, v)))
        .filter(|(_, v)| allow_prerelease || !v.is_prerelease())
        .filter(|(_, v)| specifiers_match(&specifiers, v))
        .max_by(|(_, a), (_, b)| a.cmp(b));

    match best {
        Some((raw_version, _)) => (Some(raw_version.clone()), count, None),
        None => (None, count, Some(format!("No versions match spec '{raw}'"))),
    }
}

fn raw_mentions_prerelease(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    ["rc", "alpha", "beta", "dev", "a0", "a1", "a2", "b0", "b1", "b2"]
        .iter()
        .any(|marker| lower.contains(marker))
}
