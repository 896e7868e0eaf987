use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ecosystem::Ecosystem;

/// Resolution strategy derived from the requested spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    Exact,
    Range,
    Latest,
}

impl ResolutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionMode::Exact => "exact",
            ResolutionMode::Range => "range",
            ResolutionMode::Latest => "latest",
        }
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized representation of a version spec and derived behavior flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    pub raw: String,
    pub mode: ResolutionMode,
    pub include_prerelease: bool,
}

/// Where a package request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    Cli,
    List,
    Manifest,
    Lockfile,
    Fallback,
}

/// Resolution input across all sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub ecosystem: Ecosystem,
    /// Normalized package name, or Maven `groupId:artifactId`.
    pub identifier: String,
    pub requested_spec: Option<VersionSpec>,
    pub source: RequestSource,
    pub raw_token: Option<String>,
}

/// Resolution outcome to feed downstream enrichment and exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    pub ecosystem: Ecosystem,
    pub identifier: String,
    pub requested_spec: Option<String>,
    pub resolved_version: Option<String>,
    pub resolution_mode: ResolutionMode,
    pub candidate_count: usize,
    pub error: Option<String>,
}

/// Split `identifier[:spec]` on the rightmost colon.
///
/// Ecosystem-agnostic; Maven's intrinsic colon is handled by the caller.
pub fn tokenize_rightmost_colon(token: &str) -> (String, Option<String>) {
    let token = token.trim();
    match token.rsplit_once(':') {
        Some((identifier, spec)) => {
            let spec = spec.trim();
            let spec = if spec.is_empty() {
                None
            } else {
                Some(spec.to_string())
            };
            (identifier.trim().to_string(), spec)
        }
        None => (token.to_string(), None),
    }
}

/// Normalize a PyPI package name per PEP 503: runs of `-`, `_`, `.`
/// collapse to a single `-`, lowercased.
pub fn normalize_pypi_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for ch in name.chars() {
        if ch == '-' || ch == '_' || ch == '.' {
            in_separator = true;
        } else {
            if in_separator && !out.is_empty() {
                out.push('-');
            }
            in_separator = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

fn normalize_identifier(identifier: &str, ecosystem: Ecosystem) -> String {
    match ecosystem {
        Ecosystem::Pypi => normalize_pypi_name(identifier),
        _ => identifier.to_string(),
    }
}

fn determine_resolution_mode(spec: &str) -> ResolutionMode {
    const RANGE_OPS: &[char] = &[
        '^', '~', '*', 'x', '-', '<', '>', '=', '!', '[', ']', '(', ')', ',',
    ];
    if spec.contains(RANGE_OPS) {
        ResolutionMode::Range
    } else {
        ResolutionMode::Exact
    }
}

fn determine_include_prerelease(spec: &str, ecosystem: Ecosystem) -> bool {
    if ecosystem != Ecosystem::Npm {
        return false;
    }
    let lower = spec.to_lowercase();
    ["pre", "rc", "alpha", "beta"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn build_spec(spec: Option<String>, ecosystem: Ecosystem) -> Option<VersionSpec> {
    let raw = spec?;
    if raw.trim().is_empty() || raw.trim().eq_ignore_ascii_case("latest") {
        return None;
    }
    let raw = raw.trim().to_string();
    Some(VersionSpec {
        mode: determine_resolution_mode(&raw),
        include_prerelease: determine_include_prerelease(&raw, ecosystem),
        raw,
    })
}

/// Parse a CLI or list-file token into a [`PackageRequest`].
///
/// Uses the rightmost-colon rule with Maven's coordinate exception: a
/// `groupId:artifactId` pair carries one intrinsic colon, so only a third
/// colon introduces a version spec.
pub fn parse_token(token: &str, ecosystem: Ecosystem, source: RequestSource) -> PackageRequest {
    let trimmed = token.trim();

    let (identifier, spec) = if ecosystem == Ecosystem::Maven {
        if trimmed.matches(':').count() <= 1 {
            (trimmed.to_string(), None)
        } else {
            tokenize_rightmost_colon(trimmed)
        }
    } else {
        tokenize_rightmost_colon(trimmed)
    };

    PackageRequest {
        ecosystem,
        identifier: normalize_identifier(&identifier, ecosystem),
        requested_spec: build_spec(spec, ecosystem),
        source,
        raw_token: Some(trimmed.to_string()),
    }
}

/// Parse a CLI token (source `cli`).
pub fn parse_cli_token(token: &str, ecosystem: Ecosystem) -> PackageRequest {
    parse_token(token, ecosystem, RequestSource::Cli)
}

/// Construct a [`PackageRequest`] from already-split manifest fields.
///
/// `"latest"` or an empty spec means no spec (resolution mode `latest`).
pub fn parse_manifest_entry(
    identifier: &str,
    raw_spec: Option<&str>,
    ecosystem: Ecosystem,
    source: RequestSource,
) -> PackageRequest {
    PackageRequest {
        ecosystem,
        identifier: normalize_identifier(identifier, ecosystem),
        requested_spec: build_spec(raw_spec.map(|s| s.to_string()), ecosystem),
        source,
        raw_token: None,
    }
}

/// Render a request back into CLI token form (`identifier[:spec]`).
pub fn render_token(req: &PackageRequest) -> String {
    match &req.requested_spec {
        Some(spec) => format!("{}:{}", req.identifier, spec.raw),
        None => req.identifier.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rightmost_colon_split() {
        assert_eq!(
            tokenize_rightmost_colon("lodash:^4.0.0"),
            ("lodash".to_string(), Some("^4.0.0".to_string()))
        );
        assert_eq!(tokenize_rightmost_colon("lodash"), ("lodash".to_string(), None));
        assert_eq!(tokenize_rightmost_colon("lodash:"), ("lodash".to_string(), None));
    }

    #[test]
    fn maven_single_colon_is_identifier_only() {
        let req = parse_cli_token("com.google.guava:guava", Ecosystem::Maven);
        assert_eq!(req.identifier, "com.google.guava:guava");
        assert!(req.requested_spec.is_none());
    }

    #[test]
    fn maven_third_colon_introduces_spec() {
        let req = parse_cli_token("com.google.guava:guava:31.1-jre", Ecosystem::Maven);
        assert_eq!(req.identifier, "com.google.guava:guava");
        let spec = req.requested_spec.unwrap();
        assert_eq!(spec.raw, "31.1-jre");
        // '-' is a range-op character, so this classifies as a range token.
        assert_eq!(spec.mode, ResolutionMode::Range);
    }

    #[test]
    fn pypi_identifier_is_pep503_normalized() {
        let req = parse_cli_token("My_Package.Name:1.0.0", Ecosystem::Pypi);
        assert_eq!(req.identifier, "my-package-name");
        assert_eq!(req.requested_spec.unwrap().mode, ResolutionMode::Exact);
    }

    #[test]
    fn pep503_collapses_runs() {
        assert_eq!(normalize_pypi_name("a.-_b"), "a-b");
        assert_eq!(normalize_pypi_name("Django"), "django");
    }

    #[test]
    fn latest_spec_means_no_spec() {
        let req = parse_cli_token("lodash:latest", Ecosystem::Npm);
        assert!(req.requested_spec.is_none());
    }

    #[test]
    fn npm_prerelease_detection() {
        let req = parse_cli_token("lodash:^4.0.0-beta.1", Ecosystem::Npm);
        let spec = req.requested_spec.unwrap();
        assert_eq!(spec.mode, ResolutionMode::Range);
        assert!(spec.include_prerelease);

        let req = parse_cli_token("requests:>=2.0rc1", Ecosystem::Pypi);
        assert!(!req.requested_spec.unwrap().include_prerelease);
    }

    #[test]
    fn render_parse_round_trip() {
        for (token, eco) in [
            ("lodash:^4.17.0", Ecosystem::Npm),
            ("lodash", Ecosystem::Npm),
            ("requests:>=2.0,<3.0", Ecosystem::Pypi),
            ("com.google.guava:guava", Ecosystem::Maven),
            ("com.google.guava:guava:[31.0,32.0)", Ecosystem::Maven),
            ("newtonsoft.json:13.0.3", Ecosystem::Nuget),
        ] {
            let req = parse_cli_token(token, eco);
            let rendered = render_token(&req);
            assert_eq!(parse_cli_token(&rendered, eco), req, "token {token}");
        }
    }
}
