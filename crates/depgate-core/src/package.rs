use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ecosystem::Ecosystem;
use crate::policy::Decision;
use crate::request::ResolutionMode;

/// Where a repository URL points after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoHost {
    Github,
    Gitlab,
    Other,
}

impl RepoHost {
    pub fn as_str(self) -> &'static str {
        match self {
            RepoHost::Github => "github",
            RepoHost::Gitlab => "gitlab",
            RepoHost::Other => "other",
        }
    }
}

impl fmt::Display for RepoHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a package version was matched to a repository tag or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "v-prefix")]
    VPrefix,
    #[serde(rename = "suffix-normalized")]
    SuffixNormalized,
    #[serde(rename = "pattern")]
    Pattern,
}

/// Result of matching a package version against repository tags/releases.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionMatch {
    pub matched: bool,
    pub match_type: Option<MatchType>,
    pub tag_or_release: Option<String>,
}

/// A non-fatal error encountered while validating a candidate repo URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoError {
    pub url: String,
    pub error_type: String,
    pub message: String,
}

/// License facts discovered from registry metadata or the POM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub id: Option<String>,
    pub available: Option<bool>,
    pub source: Option<String>,
    pub url: Option<String>,
}

/// The central mutable record, one per unique `(ecosystem, identifier)`.
///
/// The complete field set is declared up front; enrichment stages write
/// fields, heuristics and the policy engine read them. Unknown values stay
/// `None` so downstream serialization and the fact builder can materialize
/// explicit nulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    // Identity
    pub ecosystem: Ecosystem,
    pub name: String,
    /// Maven `groupId`; `None` for the other ecosystems.
    pub org_id: Option<String>,

    // Resolution
    pub requested_spec: Option<String>,
    pub resolved_version: Option<String>,
    pub resolution_mode: Option<ResolutionMode>,
    pub candidate_count: Option<usize>,

    // Registry facts
    pub exists: Option<bool>,
    pub version_count: Option<usize>,
    pub release_timestamp_ms: Option<i64>,
    pub weekly_downloads: Option<i64>,
    pub previous_release_version: Option<String>,
    pub heuristic_score: Option<f64>,
    pub license: LicenseInfo,

    // Repository discovery
    pub repo_url_normalized: Option<String>,
    pub repo_host: Option<RepoHost>,
    pub repo_present_in_registry: Option<bool>,
    pub repo_resolved: Option<bool>,
    pub repo_exists: Option<bool>,
    pub repo_stars: Option<u64>,
    pub repo_contributors: Option<u64>,
    pub repo_forks: Option<u64>,
    pub repo_open_issues: Option<u64>,
    pub repo_open_prs: Option<u64>,
    pub repo_last_activity_at: Option<String>,
    pub repo_last_commit_at: Option<String>,
    pub repo_last_merged_pr_at: Option<String>,
    pub repo_last_closed_issue_at: Option<String>,
    pub repo_version_match: Option<VersionMatch>,
    pub repo_errors: Vec<RepoError>,

    // Trust signals (tri-state)
    pub registry_signature_present: Option<bool>,
    pub previous_registry_signature_present: Option<bool>,
    pub provenance_present: Option<bool>,
    pub previous_provenance_present: Option<bool>,
    pub provenance_url: Option<String>,
    pub registry_signature_regressed: Option<bool>,
    pub provenance_regressed: Option<bool>,
    pub trust_score: Option<f64>,
    pub previous_trust_score: Option<f64>,
    pub trust_score_delta: Option<f64>,
    pub trust_score_decreased: Option<bool>,

    // Optional malware-intel flag
    pub osm_flagged: Option<bool>,

    // Heuristic risks
    pub risk_missing: Option<bool>,
    pub risk_low_score: Option<bool>,
    pub risk_min_versions: Option<bool>,
    pub risk_too_new: Option<bool>,
    pub risk_provenance_regression: Option<bool>,
    pub risk_registry_signature_regression: Option<bool>,
    pub risk_score_decrease: Option<bool>,

    // Policy output
    pub policy_decision: Option<Decision>,
    pub policy_violated_rules: Vec<String>,
    pub policy_evaluated_metrics: BTreeMap<String, serde_json::Value>,

    /// Which raw source produced each attribute, keyed by dotted path
    /// (e.g. `npm_repository_field`, `maven_pom.scm.url`, `rtd_slug`).
    pub provenance: BTreeMap<String, String>,
}

impl Package {
    /// Create an empty record for `(ecosystem, name)`.
    pub fn new(name: impl Into<String>, ecosystem: Ecosystem) -> Self {
        Self {
            ecosystem,
            name: name.into(),
            org_id: None,
            requested_spec: None,
            resolved_version: None,
            resolution_mode: None,
            candidate_count: None,
            exists: None,
            version_count: None,
            release_timestamp_ms: None,
            weekly_downloads: None,
            previous_release_version: None,
            heuristic_score: None,
            license: LicenseInfo::default(),
            repo_url_normalized: None,
            repo_host: None,
            repo_present_in_registry: None,
            repo_resolved: None,
            repo_exists: None,
            repo_stars: None,
            repo_contributors: None,
            repo_forks: None,
            repo_open_issues: None,
            repo_open_prs: None,
            repo_last_activity_at: None,
            repo_last_commit_at: None,
            repo_last_merged_pr_at: None,
            repo_last_closed_issue_at: None,
            repo_version_match: None,
            repo_errors: Vec::new(),
            registry_signature_present: None,
            previous_registry_signature_present: None,
            provenance_present: None,
            previous_provenance_present: None,
            provenance_url: None,
            registry_signature_regressed: None,
            provenance_regressed: None,
            trust_score: None,
            previous_trust_score: None,
            trust_score_delta: None,
            trust_score_decreased: None,
            osm_flagged: None,
            risk_missing: None,
            risk_low_score: None,
            risk_min_versions: None,
            risk_too_new: None,
            risk_provenance_regression: None,
            risk_registry_signature_regression: None,
            risk_score_decrease: None,
            policy_decision: None,
            policy_violated_rules: Vec::new(),
            policy_evaluated_metrics: BTreeMap::new(),
            provenance: BTreeMap::new(),
        }
    }

    /// Create a Maven record with an explicit `groupId`.
    pub fn with_org(name: impl Into<String>, org_id: impl Into<String>, ecosystem: Ecosystem) -> Self {
        let mut pkg = Self::new(name, ecosystem);
        pkg.org_id = Some(org_id.into());
        pkg
    }

    /// The registry-facing identifier (`groupId:artifactId` for Maven).
    pub fn identifier(&self) -> String {
        match &self.org_id {
            Some(org) => format!("{org}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The version used for repository tag matching.
    ///
    /// An exact pin that failed to resolve disables matching entirely
    /// (empty string); otherwise the resolved version, falling back to the
    /// registry's latest.
    pub fn match_version(&self, fallback: &str) -> String {
        if self.resolution_mode == Some(ResolutionMode::Exact) && self.resolved_version.is_none() {
            return String::new();
        }
        self.resolved_version
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Whether any heuristic risk flag is set.
    pub fn has_risk(&self) -> bool {
        [
            self.risk_missing,
            self.risk_low_score,
            self.risk_min_versions,
            self.risk_too_new,
            self.risk_provenance_regression,
            self.risk_registry_signature_regression,
            self.risk_score_decrease,
        ]
        .iter()
        .any(|flag| *flag == Some(true))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ecosystem, self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_includes_group_for_maven() {
        let pkg = Package::with_org("guava", "com.google.guava", Ecosystem::Maven);
        assert_eq!(pkg.identifier(), "com.google.guava:guava");
        assert_eq!(pkg.to_string(), "maven:com.google.guava:guava");
    }

    #[test]
    fn failed_exact_pin_disables_version_matching() {
        let mut pkg = Package::new("lodash", Ecosystem::Npm);
        pkg.resolution_mode = Some(ResolutionMode::Exact);
        pkg.resolved_version = None;
        assert_eq!(pkg.match_version("4.17.21"), "");

        pkg.resolved_version = Some("4.17.0".to_string());
        assert_eq!(pkg.match_version("4.17.21"), "4.17.0");

        pkg.resolution_mode = Some(ResolutionMode::Latest);
        pkg.resolved_version = None;
        assert_eq!(pkg.match_version("4.17.21"), "4.17.21");
    }

    #[test]
    fn has_risk_reflects_flags() {
        let mut pkg = Package::new("left-pad", Ecosystem::Npm);
        assert!(!pkg.has_risk());
        pkg.risk_too_new = Some(false);
        assert!(!pkg.has_risk());
        pkg.risk_min_versions = Some(true);
        assert!(pkg.has_risk());
    }

    #[test]
    fn match_type_serde_names() {
        let json = serde_json::to_string(&MatchType::VPrefix).unwrap();
        assert_eq!(json, "\"v-prefix\"");
        let json = serde_json::to_string(&MatchType::SuffixNormalized).unwrap();
        assert_eq!(json, "\"suffix-normalized\"");
    }
}
