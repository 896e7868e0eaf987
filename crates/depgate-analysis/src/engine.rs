//! The policy engine: ordered rule evaluation with fail-fast semantics.

use std::collections::BTreeMap;

use depgate_core::policy::{Decision, PolicyConfig, PolicyDecision, RuleSpec};

use crate::facts::Facts;
use crate::rules::{
    evaluate_license, evaluate_linked, evaluate_metrics, evaluate_regex, LinkedRule, RuleOutcome,
};

/// Evaluates policy configurations against fact maps.
///
/// Deterministic: a fixed `(facts, policy)` pair always produces the same
/// decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

/// Construct the engine with the built-in rule evaluators.
pub fn create_policy_engine() -> PolicyEngine {
    PolicyEngine
}

impl PolicyEngine {
    /// Evaluate a policy: rules run in configured order, any denial denies
    /// the whole package, and `fail_fast` (global or rule-scoped) stops
    /// after the first rule that yields violations.
    pub fn evaluate(&self, facts: &Facts, policy: &PolicyConfig) -> PolicyDecision {
        let mut violations: Vec<String> = Vec::new();
        let mut evaluated: BTreeMap<String, serde_json::Value> = BTreeMap::new();

        // Top-level `metrics` is sugar for a leading metrics rule; its
        // evaluated keys keep their bare paths.
        if let Some(metrics) = &policy.metrics {
            let outcome = evaluate_metrics(facts, metrics, false, policy.fail_fast);
            evaluated.extend(outcome.evaluated_metrics.clone());
            violations.extend(outcome.violated_rules.clone());
            if policy.fail_fast && !violations.is_empty() {
                return decision_from(violations, evaluated);
            }
        }

        for (index, rule) in policy.rules.iter().enumerate() {
            let outcome = self.evaluate_rule(facts, rule, policy.fail_fast);

            // Rule-scoped keys are prefixed so duplicate paths across
            // rules cannot collide.
            for (key, value) in outcome.evaluated_metrics {
                evaluated.insert(format!("rules[{index}].{key}"), value);
            }

            let rule_failed = !outcome.violated_rules.is_empty();
            violations.extend(outcome.violated_rules);
            if rule_failed && (policy.fail_fast || rule_fail_fast(rule)) {
                break;
            }
        }

        decision_from(violations, evaluated)
    }

    fn evaluate_rule(&self, facts: &Facts, rule: &RuleSpec, global_fail_fast: bool) -> RuleOutcome {
        match rule {
            RuleSpec::Metrics {
                metrics,
                allow_unknown,
                fail_fast,
            } => evaluate_metrics(facts, metrics, *allow_unknown, *fail_fast || global_fail_fast),
            RuleSpec::Regex {
                target,
                include,
                exclude,
                case_sensitive,
                full_match,
            } => evaluate_regex(facts, target, include, exclude, *case_sensitive, *full_match),
            RuleSpec::License {
                disallowed_licenses,
                allow_unknown,
            } => evaluate_license(facts, disallowed_licenses, *allow_unknown),
            RuleSpec::Linked {
                enabled,
                require_source_repo,
                require_version_in_source,
                allowed_providers,
                version_tag_patterns,
                name_match,
                name_match_min_len,
            } => evaluate_linked(
                facts,
                &LinkedRule {
                    enabled: *enabled,
                    require_source_repo: *require_source_repo,
                    require_version_in_source: *require_version_in_source,
                    allowed_providers,
                    version_tag_patterns,
                    name_match: *name_match,
                    name_match_min_len: *name_match_min_len,
                },
            ),
        }
    }
}

fn rule_fail_fast(rule: &RuleSpec) -> bool {
    matches!(rule, RuleSpec::Metrics { fail_fast: true, .. })
}

fn decision_from(
    violations: Vec<String>,
    evaluated: BTreeMap<String, serde_json::Value>,
) -> PolicyDecision {
    PolicyDecision {
        decision: if violations.is_empty() {
            Decision::Allow
        } else {
            Decision::Deny
        },
        violated_rules: violations,
        evaluated_metrics: evaluated,
    }
}
