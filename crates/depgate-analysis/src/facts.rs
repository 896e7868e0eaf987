//! Projection of a `Package` into a flat, typed fact map.
//!
//! Every canonical key materializes; unknown attributes become explicit
//! `null`, never absence. Dotted paths (`license.id`) traverse nested
//! objects.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use depgate_core::package::Package;
use depgate_core::trust;

/// The fact map consumed by the policy engine.
pub type Facts = BTreeMap<String, Value>;

/// Builds unified facts from package records.
///
/// Pure: two packages with equal observable fields produce equal facts for
/// the same `now_ms`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactBuilder;

impl FactBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build facts using the current wall clock for derived ages.
    pub fn build_facts(&self, pkg: &Package) -> Facts {
        self.build_facts_at(pkg, trust::now_ms())
    }

    /// Build facts with an explicit reference time.
    pub fn build_facts_at(&self, pkg: &Package, now_ms: i64) -> Facts {
        let mut facts = Facts::new();

        facts.insert("package_name".into(), Value::from(pkg.name.clone()));
        facts.insert("registry".into(), Value::from(pkg.ecosystem.as_str()));
        facts.insert("org_id".into(), opt(pkg.org_id.clone()));

        // Resolution
        facts.insert("requested_spec".into(), opt(pkg.requested_spec.clone()));
        facts.insert("resolved_version".into(), opt(pkg.resolved_version.clone()));
        facts.insert(
            "resolution_mode".into(),
            opt(pkg.resolution_mode.map(|m| m.as_str().to_string())),
        );
        facts.insert(
            "candidate_count".into(),
            opt(pkg.candidate_count.map(|c| c as u64)),
        );

        // Registry facts
        facts.insert("exists".into(), opt(pkg.exists));
        facts.insert(
            "version_count".into(),
            opt(pkg.version_count.map(|c| c as u64)),
        );
        facts.insert(
            "release_timestamp_ms".into(),
            opt(pkg.release_timestamp_ms),
        );
        facts.insert("weekly_downloads".into(), opt(pkg.weekly_downloads));
        facts.insert(
            "previous_release_version".into(),
            opt(pkg.previous_release_version.clone()),
        );
        facts.insert("heuristic_score".into(), opt(pkg.heuristic_score));
        facts.insert(
            "release_age_days".into(),
            opt(trust::age_days_from_epoch_ms(pkg.release_timestamp_ms, now_ms)),
        );

        // Repository discovery
        facts.insert(
            "source_repo".into(),
            opt(pkg.repo_url_normalized.clone()),
        );
        facts.insert(
            "repo_url_normalized".into(),
            opt(pkg.repo_url_normalized.clone()),
        );
        facts.insert(
            "repo_host".into(),
            opt(pkg.repo_host.map(|h| h.as_str().to_string())),
        );
        facts.insert("repo_resolved".into(), opt(pkg.repo_resolved));
        facts.insert("repo_exists".into(), opt(pkg.repo_exists));
        facts.insert(
            "release_found_in_source_registry".into(),
            opt(pkg.repo_present_in_registry),
        );
        facts.insert("stars_count".into(), opt(pkg.repo_stars));
        facts.insert("contributors_count".into(), opt(pkg.repo_contributors));
        facts.insert("forks_count".into(), opt(pkg.repo_forks));
        facts.insert("open_issues_count".into(), opt(pkg.repo_open_issues));
        facts.insert("open_prs_count".into(), opt(pkg.repo_open_prs));
        facts.insert(
            "repo_last_activity_at".into(),
            opt(pkg.repo_last_activity_at.clone()),
        );
        facts.insert(
            "repo_last_commit_at".into(),
            opt(pkg.repo_last_commit_at.clone()),
        );
        facts.insert(
            "repo_last_merged_pr_at".into(),
            opt(pkg.repo_last_merged_pr_at.clone()),
        );
        facts.insert(
            "repo_last_closed_issue_at".into(),
            opt(pkg.repo_last_closed_issue_at.clone()),
        );
        facts.insert(
            "version_found_in_source".into(),
            opt(pkg.repo_version_match.as_ref().map(|m| m.matched)),
        );

        // License, both nested and via the availability shorthand
        facts.insert(
            "license".into(),
            json!({
                "id": opt(pkg.license.id.clone()),
                "available": opt(pkg.license.available),
                "source": opt(pkg.license.source.clone()),
                "url": opt(pkg.license.url.clone()),
            }),
        );
        facts.insert(
            "is_license_available".into(),
            opt(pkg.license.available),
        );

        // Trust signals
        facts.insert(
            "registry_signature_present".into(),
            opt(pkg.registry_signature_present),
        );
        facts.insert(
            "previous_registry_signature_present".into(),
            opt(pkg.previous_registry_signature_present),
        );
        facts.insert("provenance_present".into(), opt(pkg.provenance_present));
        facts.insert(
            "previous_provenance_present".into(),
            opt(pkg.previous_provenance_present),
        );
        facts.insert("provenance_url".into(), opt(pkg.provenance_url.clone()));
        facts.insert(
            "registry_signature_regressed".into(),
            opt(pkg.registry_signature_regressed),
        );
        facts.insert(
            "provenance_regressed".into(),
            opt(pkg.provenance_regressed),
        );
        facts.insert(
            "supply_chain_trust_score".into(),
            opt(pkg.trust_score),
        );
        facts.insert(
            "supply_chain_previous_trust_score".into(),
            opt(pkg.previous_trust_score),
        );
        facts.insert(
            "supply_chain_trust_score_delta".into(),
            opt(pkg.trust_score_delta),
        );
        facts.insert(
            "supply_chain_trust_score_decreased".into(),
            opt(pkg.trust_score_decreased),
        );

        facts.insert("osm_flagged".into(), opt(pkg.osm_flagged));

        facts
    }
}

fn opt<T: Into<Value>>(value: Option<T>) -> Value {
    value.map(Into::into).unwrap_or(Value::Null)
}

/// Resolve a dotted path against a fact map; `None` when any hop is
/// missing (an explicit `null` leaf is returned as `Some(Null)`).
pub fn get_path<'a>(facts: &'a Facts, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = facts.get(first)?;
    for key in parts {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    use depgate_core::ecosystem::Ecosystem;
    use depgate_core::package::{LicenseInfo, VersionMatch};

    const DAY_MS: i64 = 86_400_000;

    #[test]
    fn every_key_materializes_with_nulls() {
        let pkg = Package::new("lodash", Ecosystem::Npm);
        let facts = FactBuilder::new().build_facts_at(&pkg, 0);
        assert_eq!(facts["package_name"], json!("lodash"));
        assert_eq!(facts["registry"], json!("npm"));
        assert_eq!(facts["stars_count"], Value::Null);
        assert_eq!(facts["release_age_days"], Value::Null);
        assert_eq!(facts["license"]["id"], Value::Null);
        assert_eq!(facts["version_found_in_source"], Value::Null);
    }

    #[test]
    fn builder_is_pure() {
        let mut pkg = Package::new("lodash", Ecosystem::Npm);
        pkg.repo_stars = Some(42);
        let builder = FactBuilder::new();
        assert_eq!(
            builder.build_facts_at(&pkg, 1000),
            builder.build_facts_at(&pkg.clone(), 1000)
        );
    }

    #[test]
    fn release_age_derives_from_timestamp() {
        let mut pkg = Package::new("lodash", Ecosystem::Npm);
        pkg.release_timestamp_ms = Some(0);
        let facts = FactBuilder::new().build_facts_at(&pkg, 5 * DAY_MS);
        assert_eq!(facts["release_age_days"], json!(5));
    }

    #[test]
    fn version_match_projects_to_flag() {
        let mut pkg = Package::new("lodash", Ecosystem::Npm);
        pkg.repo_version_match = Some(VersionMatch {
            matched: true,
            match_type: None,
            tag_or_release: Some("v1.0.0".to_string()),
        });
        let facts = FactBuilder::new().build_facts_at(&pkg, 0);
        assert_eq!(facts["version_found_in_source"], json!(true));

        pkg.repo_version_match = Some(VersionMatch::default());
        let facts = FactBuilder::new().build_facts_at(&pkg, 0);
        assert_eq!(facts["version_found_in_source"], json!(false));
    }

    #[test]
    fn dotted_path_resolution() {
        let mut pkg = Package::new("lodash", Ecosystem::Npm);
        pkg.license = LicenseInfo {
            id: Some("MIT".to_string()),
            available: Some(true),
            source: Some("npm_license_field".to_string()),
            url: None,
        };
        let facts = FactBuilder::new().build_facts_at(&pkg, 0);
        assert_eq!(get_path(&facts, "license.id"), Some(&json!("MIT")));
        assert_eq!(get_path(&facts, "license.url"), Some(&Value::Null));
        assert_eq!(get_path(&facts, "license.nope"), None);
        assert_eq!(get_path(&facts, "nope.at.all"), None);
    }
}
