//! Policy evaluation in proxy context.
//!
//! Wraps the policy engine behind the decision cache. A transient
//! `Package` is built per request from the parsed name/version, evaluated,
//! and discarded; only the decision is kept.

use std::sync::{Arc, RwLock};

use depgate_analysis::engine::{create_policy_engine, PolicyEngine};
use depgate_analysis::facts::FactBuilder;
use depgate_core::config::DecisionMode;
use depgate_core::ecosystem::Ecosystem;
use depgate_core::package::Package;
use depgate_core::policy::{Decision, PolicyConfig, PolicyDecision};

use crate::cache::DecisionCache;

/// Evaluates packages against policy rules for the proxy pipeline.
pub struct ProxyEvaluator {
    policy: RwLock<Option<PolicyConfig>>,
    decision_mode: RwLock<DecisionMode>,
    cache: Arc<DecisionCache>,
    engine: PolicyEngine,
    fact_builder: FactBuilder,
}

impl ProxyEvaluator {
    pub fn new(
        policy: Option<PolicyConfig>,
        decision_mode: DecisionMode,
        cache: Arc<DecisionCache>,
    ) -> Self {
        Self {
            policy: RwLock::new(policy.filter(|p| !p.is_empty())),
            decision_mode: RwLock::new(decision_mode),
            cache,
            engine: create_policy_engine(),
            fact_builder: FactBuilder::new(),
        }
    }

    pub fn decision_mode(&self) -> DecisionMode {
        *self.decision_mode.read().expect("decision mode poisoned")
    }

    /// Swap the policy configuration; cached decisions are stale and drop.
    pub fn set_policy_config(&self, policy: Option<PolicyConfig>) {
        *self.policy.write().expect("policy poisoned") = policy.filter(|p| !p.is_empty());
        self.cache.clear();
    }

    /// Swap the decision mode; cached decisions are stale and drop.
    pub fn set_decision_mode(&self, mode: DecisionMode) {
        *self.decision_mode.write().expect("decision mode poisoned") = mode;
        self.cache.clear();
    }

    /// Evaluate one package reference, consulting the decision cache.
    pub fn evaluate(
        &self,
        package_name: &str,
        version: Option<&str>,
        registry: Ecosystem,
    ) -> PolicyDecision {
        let registry_name = registry.as_str();

        if let Some(cached) = self.cache.get(registry_name, package_name, version) {
            tracing::debug!(registry = registry_name, package_name, "decision cache hit");
            return cached;
        }

        let policy = self.policy.read().expect("policy poisoned").clone();
        let Some(policy) = policy else {
            return PolicyDecision::allow();
        };

        let pkg = transient_package(package_name, version, registry);
        let facts = self.fact_builder.build_facts(&pkg);
        let decision = self.engine.evaluate(&facts, &policy);
        let final_decision = self.apply_decision_mode(decision);

        self.cache
            .set(registry_name, package_name, version, final_decision.clone());
        final_decision
    }

    /// `block` passes a deny through; `warn`/`audit` demote it to allow
    /// with the violations logged at the corresponding level.
    fn apply_decision_mode(&self, decision: PolicyDecision) -> PolicyDecision {
        if decision.decision == Decision::Allow {
            return decision;
        }
        match self.decision_mode() {
            DecisionMode::Block => decision,
            DecisionMode::Warn => {
                tracing::warn!(
                    violations = decision.violated_rules.join(", "),
                    "policy violation (warn mode)"
                );
                PolicyDecision {
                    decision: Decision::Allow,
                    ..decision
                }
            }
            DecisionMode::Audit => {
                tracing::info!(
                    violations = decision.violated_rules.join(", "),
                    "policy violation (audit mode)"
                );
                PolicyDecision {
                    decision: Decision::Allow,
                    ..decision
                }
            }
        }
    }
}

/// Minimal record from request-level knowledge; Maven coordinates split
/// into group and artifact.
fn transient_package(package_name: &str, version: Option<&str>, registry: Ecosystem) -> Package {
    let mut pkg = match registry {
        Ecosystem::Maven => match package_name.split_once(':') {
            Some((group, artifact)) => Package::with_org(artifact, group, registry),
            None => Package::new(package_name, registry),
        },
        _ => Package::new(package_name, registry),
    };
    if let Some(version) = version {
        pkg.resolved_version = Some(version.to_string());
        pkg.requested_spec = Some(version.to_string());
    }
    pkg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn exclude_policy() -> PolicyConfig {
        serde_json::from_value(json!({
            "rules": [
                {"type": "regex", "target": "package_name", "exclude": ["bad-.*"]}
            ]
        }))
        .unwrap()
    }

    fn evaluator(policy: Option<PolicyConfig>, mode: DecisionMode) -> ProxyEvaluator {
        ProxyEvaluator::new(
            policy,
            mode,
            Arc::new(DecisionCache::new(Duration::from_secs(60))),
        )
    }

    #[test]
    fn no_policy_allows_everything() {
        let eval = evaluator(None, DecisionMode::Block);
        let decision = eval.evaluate("anything", None, Ecosystem::Npm);
        assert_eq!(decision.decision, Decision::Allow);
    }

    #[test]
    fn block_mode_denies_excluded_package() {
        let eval = evaluator(Some(exclude_policy()), DecisionMode::Block);
        let decision = eval.evaluate("bad-pkg", None, Ecosystem::Npm);
        assert_eq!(decision.decision, Decision::Deny);
        assert_eq!(
            decision.violated_rules,
            vec!["excluded by pattern: bad-.*".to_string()]
        );
    }

    #[test]
    fn warn_mode_demotes_to_allow_keeping_violations() {
        let eval = evaluator(Some(exclude_policy()), DecisionMode::Warn);
        let decision = eval.evaluate("bad-pkg", None, Ecosystem::Npm);
        assert_eq!(decision.decision, Decision::Allow);
        assert!(!decision.violated_rules.is_empty());
    }

    #[test]
    fn second_lookup_hits_cache() {
        let cache = Arc::new(DecisionCache::new(Duration::from_secs(60)));
        let eval = ProxyEvaluator::new(
            Some(exclude_policy()),
            DecisionMode::Block,
            cache.clone(),
        );

        let first = eval.evaluate("bad-pkg", Some("1.0.0"), Ecosystem::Npm);
        assert!(cache.get("npm", "bad-pkg", Some("1.0.0")).is_some());
        let second = eval.evaluate("bad-pkg", Some("1.0.0"), Ecosystem::Npm);
        assert_eq!(first, second);
    }

    #[test]
    fn policy_swap_clears_cache() {
        let cache = Arc::new(DecisionCache::new(Duration::from_secs(60)));
        let eval = ProxyEvaluator::new(
            Some(exclude_policy()),
            DecisionMode::Block,
            cache.clone(),
        );
        eval.evaluate("bad-pkg", None, Ecosystem::Npm);
        assert!(cache.get("npm", "bad-pkg", None).is_some());

        eval.set_policy_config(None);
        assert!(cache.get("npm", "bad-pkg", None).is_none());
    }

    #[test]
    fn maven_names_split_into_coordinates() {
        let pkg = transient_package("com.google.guava:guava", Some("33.0.0-jre"), Ecosystem::Maven);
        assert_eq!(pkg.org_id.as_deref(), Some("com.google.guava"));
        assert_eq!(pkg.name, "guava");
        assert_eq!(pkg.resolved_version.as_deref(), Some("33.0.0-jre"));
    }
}
