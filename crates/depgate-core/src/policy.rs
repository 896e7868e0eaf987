use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The overall verdict of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured outcome of evaluating a policy against a fact map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub violated_rules: Vec<String>,
    pub evaluated_metrics: BTreeMap<String, Value>,
}

impl PolicyDecision {
    /// An allow decision with no violations.
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            violated_rules: Vec::new(),
            evaluated_metrics: BTreeMap::new(),
        }
    }
}

/// Constraint map for a metrics rule: dotted fact path to `{op: expected}`.
pub type MetricsMap = BTreeMap<String, BTreeMap<String, Value>>;

/// How a linked rule compares the package name to the repository name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMatchMode {
    #[default]
    None,
    Exact,
    Partial,
}

/// A single policy rule, tagged by `type` in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleSpec {
    /// Compare fact values against typed constraints.
    Metrics {
        #[serde(default)]
        metrics: MetricsMap,
        #[serde(default)]
        allow_unknown: bool,
        #[serde(default)]
        fail_fast: bool,
    },
    /// Include/exclude regular expressions over a single fact value.
    Regex {
        #[serde(default = "default_regex_target")]
        target: String,
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(default = "default_true")]
        case_sensitive: bool,
        #[serde(default)]
        full_match: bool,
    },
    /// Deny disallowed (or unknown) licenses.
    License {
        #[serde(default)]
        disallowed_licenses: Vec<String>,
        #[serde(default)]
        allow_unknown: bool,
    },
    /// Enforce linked-source provenance on the SCM side.
    Linked {
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default)]
        require_source_repo: bool,
        #[serde(default)]
        require_version_in_source: bool,
        #[serde(default)]
        allowed_providers: Vec<String>,
        #[serde(default)]
        version_tag_patterns: Vec<String>,
        #[serde(default)]
        name_match: NameMatchMode,
        #[serde(default = "default_name_match_min_len")]
        name_match_min_len: usize,
    },
}

fn default_regex_target() -> String {
    "package_name".to_string()
}

fn default_true() -> bool {
    true
}

fn default_name_match_min_len() -> usize {
    4
}

/// A full policy configuration.
///
/// Top-level `metrics` is sugar for a leading metrics rule; the engine
/// expands it before evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleSpec>,
}

impl PolicyConfig {
    /// True when there is nothing to evaluate: empty policies always allow.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.metrics.as_ref().map_or(true, |m| m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_spec_deserializes_by_tag() {
        let json = r#"{
            "type": "regex",
            "target": "package_name",
            "exclude": ["bad-.*"]
        }"#;
        let rule: RuleSpec = serde_json::from_str(json).unwrap();
        match rule {
            RuleSpec::Regex {
                target,
                exclude,
                case_sensitive,
                full_match,
                include,
            } => {
                assert_eq!(target, "package_name");
                assert_eq!(exclude, vec!["bad-.*".to_string()]);
                assert!(case_sensitive);
                assert!(!full_match);
                assert!(include.is_empty());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn linked_rule_defaults() {
        let rule: RuleSpec = serde_json::from_str(r#"{"type": "linked"}"#).unwrap();
        match rule {
            RuleSpec::Linked {
                enabled,
                require_source_repo,
                name_match,
                ..
            } => {
                assert!(enabled);
                assert!(!require_source_repo);
                assert_eq!(name_match, NameMatchMode::None);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn empty_policy_is_empty() {
        let policy = PolicyConfig::default();
        assert!(policy.is_empty());

        let policy: PolicyConfig = serde_json::from_str(
            r#"{"fail_fast": false, "metrics": {"stars_count": {"min": 5}}}"#,
        )
        .unwrap();
        assert!(!policy.is_empty());
    }

    #[test]
    fn decision_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Decision::Deny).unwrap(), "\"deny\"");
    }
}
