//! Parser → evaluator → decision-cache pipeline, without a live upstream.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use depgate_core::config::DecisionMode;
use depgate_core::ecosystem::Ecosystem;
use depgate_core::policy::{Decision, PolicyConfig};
use depgate_proxy::cache::DecisionCache;
use depgate_proxy::evaluator::ProxyEvaluator;
use depgate_proxy::request_parser::RequestParser;

fn exclude_bad_policy() -> PolicyConfig {
    serde_json::from_value(json!({
        "rules": [
            {"type": "regex", "target": "package_name", "exclude": ["bad-.*"]}
        ]
    }))
    .unwrap()
}

#[test]
fn blocked_npm_request_end_to_end() {
    let parser = RequestParser::new();
    let cache = Arc::new(DecisionCache::new(Duration::from_secs(3600)));
    let evaluator = ProxyEvaluator::new(
        Some(exclude_bad_policy()),
        DecisionMode::Block,
        cache.clone(),
    );

    let parsed = parser.parse("/bad-pkg", None);
    assert_eq!(parsed.registry, Some(Ecosystem::Npm));
    assert_eq!(parsed.package_name, "bad-pkg");
    assert!(parsed.is_metadata_request);

    let decision = evaluator.evaluate(&parsed.package_name, parsed.version.as_deref(), Ecosystem::Npm);
    assert_eq!(decision.decision, Decision::Deny);
    assert_eq!(
        decision.violated_rules,
        vec!["excluded by pattern: bad-.*".to_string()]
    );

    // The second identical request is served straight from the cache.
    let cached = cache.get("npm", "bad-pkg", None).unwrap();
    assert_eq!(cached, decision);
    let second = evaluator.evaluate("bad-pkg", None, Ecosystem::Npm);
    assert_eq!(second, decision);
}

#[test]
fn tarball_requests_are_gated_too() {
    let parser = RequestParser::new();
    let evaluator = ProxyEvaluator::new(
        Some(exclude_bad_policy()),
        DecisionMode::Block,
        Arc::new(DecisionCache::new(Duration::from_secs(60))),
    );

    let parsed = parser.parse("/bad-pkg/-/bad-pkg-1.0.0.tgz", None);
    assert!(parsed.is_tarball_request);
    assert_eq!(parsed.version.as_deref(), Some("1.0.0"));

    let decision = evaluator.evaluate(&parsed.package_name, parsed.version.as_deref(), Ecosystem::Npm);
    assert_eq!(decision.decision, Decision::Deny);
}

#[test]
fn maven_coordinates_gate_on_group_and_artifact() {
    let parser = RequestParser::new();
    let parsed = parser.parse("/maven2/com/evil/backdoor/maven-metadata.xml", None);
    assert_eq!(parsed.registry, Some(Ecosystem::Maven));
    assert_eq!(parsed.package_name, "com.evil:backdoor");

    let policy: PolicyConfig = serde_json::from_value(json!({
        "rules": [
            {"type": "regex", "target": "org_id", "exclude": ["^com\\.evil$"]}
        ]
    }))
    .unwrap();
    let evaluator = ProxyEvaluator::new(
        Some(policy),
        DecisionMode::Block,
        Arc::new(DecisionCache::new(Duration::from_secs(60))),
    );
    let decision = evaluator.evaluate(&parsed.package_name, None, Ecosystem::Maven);
    assert_eq!(decision.decision, Decision::Deny);
}

#[test]
fn audit_mode_allows_but_records_violations() {
    let evaluator = ProxyEvaluator::new(
        Some(exclude_bad_policy()),
        DecisionMode::Audit,
        Arc::new(DecisionCache::new(Duration::from_secs(60))),
    );
    let decision = evaluator.evaluate("bad-pkg", Some("2.0.0"), Ecosystem::Npm);
    assert_eq!(decision.decision, Decision::Allow);
    assert_eq!(
        decision.violated_rules,
        vec!["excluded by pattern: bad-.*".to_string()]
    );
}
