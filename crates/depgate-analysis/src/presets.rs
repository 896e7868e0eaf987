//! Built-in policy presets.

use serde_json::json;

use depgate_core::policy::PolicyConfig;

/// Default minimum release age, in days, for the supply-chain presets.
pub const DEFAULT_MIN_RELEASE_AGE_DAYS: i64 = 2;

/// Build a built-in policy preset by name.
///
/// Unknown names fall back to `default`. The supply-chain presets differ
/// only in `allow_unknown`: the strict variant denies on missing facts.
pub fn build_policy_preset(name: Option<&str>, min_release_age_days: Option<i64>) -> PolicyConfig {
    let preset = name.unwrap_or("default").trim().to_lowercase();
    let release_age_days = min_release_age_days
        .unwrap_or(DEFAULT_MIN_RELEASE_AGE_DAYS)
        .max(0);

    let value = match preset.as_str() {
        "supply-chain" | "supply-chain-strict" => {
            let allow_unknown = preset == "supply-chain";
            json!({
                "fail_fast": false,
                "rules": [
                    {
                        "type": "metrics",
                        "allow_unknown": allow_unknown,
                        "metrics": {
                            "release_age_days": {"min": release_age_days},
                            "supply_chain_trust_score_delta": {"min": 0},
                            "provenance_regressed": {"eq": false},
                            "registry_signature_regressed": {"eq": false}
                        }
                    }
                ]
            })
        }
        _ => json!({
            "fail_fast": false,
            "metrics": {
                "stars_count": {"min": 5},
                "heuristic_score": {"min": 0.6}
            }
        }),
    };

    serde_json::from_value(value).expect("built-in presets deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use depgate_core::policy::RuleSpec;

    #[test]
    fn default_preset_uses_metric_sugar() {
        let preset = build_policy_preset(None, None);
        assert!(!preset.fail_fast);
        let metrics = preset.metrics.unwrap();
        assert!(metrics.contains_key("stars_count"));
        assert!(metrics.contains_key("heuristic_score"));
        assert!(preset.rules.is_empty());
    }

    #[test]
    fn unknown_preset_falls_back_to_default() {
        let preset = build_policy_preset(Some("nonsense"), None);
        assert!(preset.metrics.is_some());
    }

    #[test]
    fn supply_chain_presets_differ_in_allow_unknown() {
        let lax = build_policy_preset(Some("supply-chain"), Some(7));
        let strict = build_policy_preset(Some("supply-chain-strict"), Some(7));
        for (preset, expected) in [(lax, true), (strict, false)] {
            match &preset.rules[0] {
                RuleSpec::Metrics {
                    allow_unknown,
                    metrics,
                    ..
                } => {
                    assert_eq!(*allow_unknown, expected);
                    assert_eq!(
                        metrics["release_age_days"]["min"],
                        serde_json::json!(7)
                    );
                    assert!(metrics.contains_key("provenance_regressed"));
                }
                other => panic!("expected metrics rule, got {other:?}"),
            }
        }
    }

    #[test]
    fn negative_age_clamps_to_zero() {
        let preset = build_policy_preset(Some("supply-chain"), Some(-3));
        match &preset.rules[0] {
            RuleSpec::Metrics { metrics, .. } => {
                assert_eq!(metrics["release_age_days"]["min"], serde_json::json!(0));
            }
            other => panic!("expected metrics rule, got {other:?}"),
        }
    }
}
