//! End-to-end policy scenarios: facts built from real package records,
//! evaluated through presets and custom rules.

use serde_json::json;

use depgate_analysis::engine::create_policy_engine;
use depgate_analysis::facts::FactBuilder;
use depgate_analysis::heuristics;
use depgate_analysis::presets::build_policy_preset;
use depgate_analysis::runner::{assemble_policy_config, run_policy_analysis};
use depgate_core::config::HeuristicsConfig;
use depgate_core::ecosystem::Ecosystem;
use depgate_core::package::{Package, VersionMatch};
use depgate_core::policy::{Decision, PolicyConfig};

const DAY_MS: i64 = 86_400_000;

#[test]
fn npm_metric_deny_against_default_preset() {
    let mut pkg = Package::new("shady-pkg", Ecosystem::Npm);
    pkg.exists = Some(true);
    pkg.repo_stars = Some(1);
    pkg.heuristic_score = Some(0.3);

    let facts = FactBuilder::new().build_facts_at(&pkg, 0);
    let preset = build_policy_preset(None, None);
    let decision = create_policy_engine().evaluate(&facts, &preset);

    assert_eq!(decision.decision, Decision::Deny);
    assert!(decision
        .violated_rules
        .contains(&"stars_count min 5 failed (actual: 1)".to_string()));
    assert!(decision
        .violated_rules
        .contains(&"heuristic_score min 0.6 failed (actual: 0.3)".to_string()));
}

#[test]
fn empty_policy_allows_with_no_violations() {
    let pkg = Package::new("anything", Ecosystem::Pypi);
    let facts = FactBuilder::new().build_facts_at(&pkg, 0);
    let decision = create_policy_engine().evaluate(&facts, &PolicyConfig::default());
    assert_eq!(decision.decision, Decision::Allow);
    assert!(decision.violated_rules.is_empty());
}

#[test]
fn supply_chain_preset_flags_regressions() {
    let mut pkg = Package::new("regressed", Ecosystem::Pypi);
    pkg.exists = Some(true);
    pkg.release_timestamp_ms = Some(0);
    pkg.registry_signature_present = Some(false);
    pkg.previous_registry_signature_present = Some(true);
    pkg.registry_signature_regressed = Some(true);
    pkg.provenance_regressed = Some(false);
    pkg.trust_score = Some(0.0);
    pkg.previous_trust_score = Some(0.5);
    pkg.trust_score_delta = Some(-0.5);

    // Ten days old: the age gate passes, the regression gate does not.
    let facts = FactBuilder::new().build_facts_at(&pkg, 10 * DAY_MS);
    let preset = build_policy_preset(Some("supply-chain-strict"), Some(2));
    let decision = create_policy_engine().evaluate(&facts, &preset);

    assert_eq!(decision.decision, Decision::Deny);
    assert!(decision
        .violated_rules
        .iter()
        .any(|v| v.contains("registry_signature_regressed")));
    assert!(decision
        .violated_rules
        .iter()
        .any(|v| v.contains("supply_chain_trust_score_delta")));
}

#[test]
fn linked_rule_passes_on_validated_repo() {
    let mut pkg = Package::new("lodash", Ecosystem::Npm);
    pkg.exists = Some(true);
    pkg.repo_url_normalized = Some("https://github.com/lodash/lodash".to_string());
    pkg.repo_resolved = Some(true);
    pkg.repo_exists = Some(true);
    pkg.repo_host = Some(depgate_core::package::RepoHost::Github);
    pkg.resolved_version = Some("4.17.21".to_string());
    pkg.repo_version_match = Some(VersionMatch {
        matched: true,
        match_type: Some(depgate_core::package::MatchType::Exact),
        tag_or_release: Some("4.17.21".to_string()),
    });

    let facts = FactBuilder::new().build_facts_at(&pkg, 0);
    let policy: PolicyConfig = serde_json::from_value(json!({
        "rules": [{
            "type": "linked",
            "enabled": true,
            "require_source_repo": true,
            "require_version_in_source": true,
            "allowed_providers": ["github"],
            "name_match": "exact"
        }]
    }))
    .unwrap();
    let decision = create_policy_engine().evaluate(&facts, &policy);
    assert_eq!(decision.decision, Decision::Allow, "{:?}", decision.violated_rules);
}

#[test]
fn heuristics_then_policy_annotation_flow() {
    let mut packages = vec![{
        let mut pkg = Package::new("brand-new", Ecosystem::Npm);
        pkg.exists = Some(true);
        pkg.version_count = Some(1);
        pkg.release_timestamp_ms = Some(0);
        pkg.repo_stars = Some(100);
        pkg.heuristic_score = Some(0.9);
        pkg
    }];

    heuristics::run_heuristics_at(&mut packages, &HeuristicsConfig::default(), DAY_MS);
    assert_eq!(packages[0].risk_too_new, Some(true));
    assert_eq!(packages[0].risk_min_versions, Some(true));
    assert!(packages[0].has_risk());

    let policy = assemble_policy_config(None, None, None, &[]).unwrap();
    run_policy_analysis(&mut packages, &policy);
    assert_eq!(packages[0].policy_decision, Some(Decision::Allow));
}

#[test]
fn overrides_tighten_the_default_preset() {
    let mut packages = vec![{
        let mut pkg = Package::new("popular", Ecosystem::Npm);
        pkg.exists = Some(true);
        pkg.repo_stars = Some(50);
        pkg.heuristic_score = Some(0.9);
        pkg
    }];

    let policy = assemble_policy_config(
        None,
        None,
        None,
        &["policy.metrics.stars_count.min=1000".to_string()],
    )
    .unwrap();
    run_policy_analysis(&mut packages, &policy);

    assert_eq!(packages[0].policy_decision, Some(Decision::Deny));
    assert!(packages[0]
        .policy_violated_rules
        .contains(&"stars_count min 1000 failed (actual: 50)".to_string()));
}
