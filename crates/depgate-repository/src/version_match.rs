//! Version-to-tag matching.
//!
//! Strategies are tried in order and the first hit wins: exact string
//! equality, v-prefix tolerance (`1.0.0` ↔ `v1.0.0`), suffix-normalized
//! comparison (lowercase, strip `.RELEASE`/`.Final`/`.GA`), and user
//! patterns with a `<v>` placeholder.

use regex::RegexBuilder;

use depgate_core::package::{MatchType, VersionMatch};

use crate::providers::TagOrRelease;

/// Matches package versions against repository tags and releases.
#[derive(Debug, Clone, Default)]
pub struct VersionMatcher {
    patterns: Vec<String>,
}

impl VersionMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// With user-supplied tag patterns, e.g. `["release-<v>"]`.
    pub fn with_patterns(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// Lowercase and strip the common Maven release suffixes.
    pub fn normalize_version(&self, version: &str) -> String {
        let mut normalized = version.to_lowercase();
        for suffix in [".release", ".final", ".ga"] {
            if let Some(stripped) = normalized.strip_suffix(suffix) {
                normalized = stripped.to_string();
                break;
            }
        }
        normalized
    }

    /// Find the first artifact matching the package version.
    ///
    /// Idempotent: the same inputs always produce the same result. An empty
    /// version never matches (exact-pin resolution failures disable
    /// matching upstream).
    pub fn find_match(&self, package_version: &str, artifacts: &[TagOrRelease]) -> VersionMatch {
        if package_version.is_empty() {
            return VersionMatch::default();
        }

        if let Some(artifact) = self.find_exact(package_version, artifacts) {
            return hit(MatchType::Exact, artifact);
        }
        if let Some(artifact) = self.find_v_prefix(package_version, artifacts) {
            return hit(MatchType::VPrefix, artifact);
        }
        if let Some(artifact) = self.find_normalized(package_version, artifacts) {
            return hit(MatchType::SuffixNormalized, artifact);
        }
        for pattern in &self.patterns {
            if let Some(artifact) = self.find_pattern(package_version, artifacts, pattern) {
                return hit(MatchType::Pattern, artifact);
            }
        }

        VersionMatch::default()
    }

    fn find_exact<'a>(
        &self,
        version: &str,
        artifacts: &'a [TagOrRelease],
    ) -> Option<&'a TagOrRelease> {
        artifacts.iter().find(|artifact| artifact.name == version)
    }

    /// `v1.0.0` matches tag `1.0.0` and `1.0.0` matches tag `v1.0.0`.
    fn find_v_prefix<'a>(
        &self,
        version: &str,
        artifacts: &'a [TagOrRelease],
    ) -> Option<&'a TagOrRelease> {
        if let Some(base) = version.strip_prefix('v') {
            if let Some(artifact) = artifacts.iter().find(|artifact| artifact.name == base) {
                return Some(artifact);
            }
        }
        let prefixed = format!("v{version}");
        artifacts.iter().find(|artifact| artifact.name == prefixed)
    }

    fn find_normalized<'a>(
        &self,
        version: &str,
        artifacts: &'a [TagOrRelease],
    ) -> Option<&'a TagOrRelease> {
        let wanted = self.normalize_version(version);
        artifacts
            .iter()
            .find(|artifact| self.normalize_version(&artifact.name) == wanted)
    }

    fn find_pattern<'a>(
        &self,
        version: &str,
        artifacts: &'a [TagOrRelease],
        pattern: &str,
    ) -> Option<&'a TagOrRelease> {
        let expanded = pattern.replace("<v>", &regex::escape(version));
        let compiled = RegexBuilder::new(&expanded)
            .case_insensitive(true)
            .build()
            .ok()?;
        artifacts
            .iter()
            .find(|artifact| compiled.is_match(&artifact.name))
    }
}

fn hit(match_type: MatchType, artifact: &TagOrRelease) -> VersionMatch {
    VersionMatch {
        matched: true,
        match_type: Some(match_type),
        tag_or_release: Some(artifact.name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<TagOrRelease> {
        names.iter().map(|n| TagOrRelease::new(*n)).collect()
    }

    #[test]
    fn exact_match_wins_first() {
        let matcher = VersionMatcher::new();
        let result = matcher.find_match("1.0.0", &tags(&["1.0.0", "v1.0.0"]));
        assert!(result.matched);
        assert_eq!(result.match_type, Some(MatchType::Exact));
        assert_eq!(result.tag_or_release.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn v_prefix_both_directions() {
        let matcher = VersionMatcher::new();

        let result = matcher.find_match("1.0.0", &tags(&["v1.0.0"]));
        assert_eq!(result.match_type, Some(MatchType::VPrefix));
        assert_eq!(result.tag_or_release.as_deref(), Some("v1.0.0"));

        let result = matcher.find_match("v2.1.0", &tags(&["2.1.0"]));
        assert_eq!(result.match_type, Some(MatchType::VPrefix));
        assert_eq!(result.tag_or_release.as_deref(), Some("2.1.0"));
    }

    #[test]
    fn suffix_normalized_match() {
        let matcher = VersionMatcher::new();
        let result = matcher.find_match("2.7.18.RELEASE", &tags(&["2.7.18"]));
        assert_eq!(result.match_type, Some(MatchType::SuffixNormalized));
    }

    #[test]
    fn pattern_match_with_placeholder() {
        let matcher = VersionMatcher::with_patterns(vec!["release-<v>".to_string()]);
        let result = matcher.find_match("3.2.1", &tags(&["release-3.2.1"]));
        assert_eq!(result.match_type, Some(MatchType::Pattern));
        assert_eq!(result.tag_or_release.as_deref(), Some("release-3.2.1"));
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let matcher = VersionMatcher::with_patterns(vec!["([".to_string()]);
        let result = matcher.find_match("1.0.0", &tags(&["release-1.0.0"]));
        assert!(!result.matched);
    }

    #[test]
    fn empty_version_never_matches() {
        let matcher = VersionMatcher::new();
        let result = matcher.find_match("", &tags(&["v1.0.0"]));
        assert!(!result.matched);
        assert_eq!(result.match_type, None);
        assert_eq!(result.tag_or_release, None);
    }

    #[test]
    fn match_is_idempotent() {
        let matcher = VersionMatcher::new();
        let artifacts = tags(&["v1.0.0", "1.1.0"]);
        let first = matcher.find_match("1.0.0", &artifacts);
        let second = matcher.find_match("1.0.0", &artifacts);
        assert_eq!(first, second);
    }
}
