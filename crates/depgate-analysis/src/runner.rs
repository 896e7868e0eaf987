//! Policy assembly and batch evaluation.
//!
//! Owns policy precedence: a user config's `policy` table replaces the
//! default preset outright, while an explicitly named preset is built first
//! and the user config deep-merged over it. `--set key=value` overrides
//! merge last, deeply, with dotted-key paths.

use serde_json::Value;

use depgate_core::package::Package;
use depgate_core::policy::{Decision, PolicyConfig};
use depgate_util::errors::DepGateError;

use crate::engine::create_policy_engine;
use crate::facts::FactBuilder;
use crate::presets::build_policy_preset;

/// Deep-merge `src` into `dest` in place; non-object values overwrite.
pub fn deep_merge(dest: &mut Value, src: &Value) {
    match (dest, src) {
        (Value::Object(dest_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                match dest_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        dest_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (dest, src) => *dest = src.clone(),
    }
}

/// Best-effort conversion of an override string to a typed value.
fn coerce_value(text: &str) -> Value {
    let trimmed = text.trim();
    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        return parsed;
    }
    match trimmed.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Value::from(n);
    }
    Value::from(trimmed)
}

fn apply_dot_path(dest: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return;
    }
    let mut current = dest;
    for key in &parts[..parts.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let map = current.as_object_mut().expect("just ensured object");
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    if !current.is_object() {
        *current = Value::Object(Default::default());
    }
    current
        .as_object_mut()
        .expect("just ensured object")
        .insert(parts[parts.len() - 1].to_string(), value);
}

/// Collect `--set key=value` pairs into an override object. A leading
/// `policy.` segment is stripped so both spellings address the same keys.
pub fn collect_policy_overrides(pairs: &[String]) -> Value {
    let mut overrides = Value::Object(Default::default());
    for item in pairs {
        let Some((key, raw_value)) = item.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let key = key.strip_prefix("policy.").unwrap_or(key);
        apply_dot_path(&mut overrides, key, coerce_value(raw_value));
    }
    overrides
}

/// Assemble the effective policy configuration.
pub fn assemble_policy_config(
    user_policy: Option<&Value>,
    preset_name: Option<&str>,
    min_release_age_days: Option<i64>,
    set_overrides: &[String],
) -> Result<PolicyConfig, DepGateError> {
    let preset_explicit = preset_name
        .map(|name| !name.trim().eq_ignore_ascii_case("default"))
        .unwrap_or(false);

    let mut policy_value = match (user_policy, preset_explicit) {
        (Some(user), false) => user.clone(),
        _ => {
            let preset = build_policy_preset(preset_name, min_release_age_days);
            let mut value =
                serde_json::to_value(&preset).expect("preset serializes");
            if let Some(user) = user_policy {
                deep_merge(&mut value, user);
            }
            value
        }
    };

    if !set_overrides.is_empty() {
        let overrides = collect_policy_overrides(set_overrides);
        deep_merge(&mut policy_value, &overrides);
    }

    serde_json::from_value(policy_value).map_err(|e| DepGateError::Config {
        message: format!("invalid policy configuration: {e}"),
    })
}

/// Evaluate the policy for every collected package and annotate each one.
pub fn run_policy_analysis(packages: &mut [Package], policy: &PolicyConfig) {
    let engine = create_policy_engine();
    let builder = FactBuilder::new();

    for pkg in packages.iter_mut() {
        let facts = builder.build_facts(pkg);
        let decision = engine.evaluate(&facts, policy);

        match decision.decision {
            Decision::Deny => tracing::warn!(
                package = %pkg,
                violations = decision.violated_rules.join(", "),
                "policy DENY"
            ),
            Decision::Allow => tracing::debug!(package = %pkg, "policy ALLOW"),
        }
        tracing::info!(
            package = %pkg,
            outcome = decision.decision.as_str(),
            violations = decision.violated_rules.len(),
            "policy outcome"
        );

        pkg.policy_decision = Some(decision.decision);
        pkg.policy_violated_rules = decision.violated_rules;
        pkg.policy_evaluated_metrics = decision.evaluated_metrics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use depgate_core::ecosystem::Ecosystem;

    #[test]
    fn deep_merge_merges_nested_keys() {
        let mut dest = json!({"metrics": {"stars_count": {"min": 5}}, "fail_fast": false});
        let src = json!({"metrics": {"heuristic_score": {"min": 0.6}}, "fail_fast": true});
        deep_merge(&mut dest, &src);
        assert_eq!(dest["metrics"]["stars_count"]["min"], json!(5));
        assert_eq!(dest["metrics"]["heuristic_score"]["min"], json!(0.6));
        assert_eq!(dest["fail_fast"], json!(true));
    }

    #[test]
    fn overrides_parse_types_and_strip_policy_prefix() {
        let overrides = collect_policy_overrides(&[
            "policy.fail_fast=true".to_string(),
            "metrics.stars_count.min=10".to_string(),
            "not-a-pair".to_string(),
        ]);
        assert_eq!(overrides["fail_fast"], json!(true));
        assert_eq!(overrides["metrics"]["stars_count"]["min"], json!(10));
    }

    #[test]
    fn user_policy_replaces_default_preset() {
        let user = json!({"metrics": {"weekly_downloads": {"min": 100}}});
        let policy = assemble_policy_config(Some(&user), Some("default"), None, &[]).unwrap();
        let metrics = policy.metrics.unwrap();
        assert!(metrics.contains_key("weekly_downloads"));
        // The default preset's stars_count constraint must NOT leak in.
        assert!(!metrics.contains_key("stars_count"));
    }

    #[test]
    fn explicit_preset_merges_user_policy_over_it() {
        let user = json!({"fail_fast": true});
        let policy =
            assemble_policy_config(Some(&user), Some("supply-chain"), Some(3), &[]).unwrap();
        assert!(policy.fail_fast);
        assert_eq!(policy.rules.len(), 1);
    }

    #[test]
    fn set_overrides_apply_last() {
        let policy = assemble_policy_config(
            None,
            None,
            None,
            &["metrics.stars_count.min=50".to_string()],
        )
        .unwrap();
        let metrics = policy.metrics.unwrap();
        assert_eq!(metrics["stars_count"]["min"], json!(50));
        // The default preset's other key survives the merge.
        assert!(metrics.contains_key("heuristic_score"));
    }

    #[test]
    fn annotates_packages_with_decisions() {
        let mut pkg = Package::new("lonely-pkg", Ecosystem::Npm);
        pkg.repo_stars = Some(1);
        pkg.heuristic_score = Some(0.3);
        let mut packages = vec![pkg];

        let policy = assemble_policy_config(None, None, None, &[]).unwrap();
        run_policy_analysis(&mut packages, &policy);

        let pkg = &packages[0];
        assert_eq!(pkg.policy_decision, Some(Decision::Deny));
        assert!(pkg
            .policy_violated_rules
            .contains(&"stars_count min 5 failed (actual: 1)".to_string()));
        assert!(pkg
            .policy_violated_rules
            .contains(&"heuristic_score min 0.6 failed (actual: 0.3)".to_string()));
    }
}
