//! Rule evaluators for the policy engine.
//!
//! Each evaluator is total: it either allows or explains its denial with a
//! stable violation string. Violation texts are part of the operator
//! contract and are asserted by tests.

use std::collections::BTreeMap;

use regex::RegexBuilder;
use serde_json::Value;

use depgate_core::policy::{Decision, MetricsMap, NameMatchMode};

use crate::comparators::{compare, format_value, CompareError};
use crate::facts::{get_path, Facts};

/// Outcome of a single rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub decision: Decision,
    pub violated_rules: Vec<String>,
    pub evaluated_metrics: BTreeMap<String, Value>,
}

impl RuleOutcome {
    fn from_violations(
        violations: Vec<String>,
        evaluated_metrics: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            decision: if violations.is_empty() {
                Decision::Allow
            } else {
                Decision::Deny
            },
            violated_rules: violations,
            evaluated_metrics,
        }
    }
}

/// Missing facts resolve to `None`; an explicit null leaf counts as missing.
fn lookup<'a>(facts: &'a Facts, path: &str) -> Option<&'a Value> {
    match get_path(facts, path) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

/// Evaluate a metrics rule: each `(path, {op: expected})` constraint set.
pub fn evaluate_metrics(
    facts: &Facts,
    metrics: &MetricsMap,
    allow_unknown: bool,
    fail_fast: bool,
) -> RuleOutcome {
    let mut violations = Vec::new();
    let mut evaluated = BTreeMap::new();

    'paths: for (path, constraints) in metrics {
        let actual = lookup(facts, path).cloned();
        evaluated.insert(path.clone(), actual.clone().unwrap_or(Value::Null));

        let Some(actual) = actual else {
            if !allow_unknown {
                violations.push(format!("missing fact: {path}"));
                if fail_fast {
                    break;
                }
            }
            continue;
        };

        for (op, expected) in constraints {
            match compare(op, &actual, expected) {
                Ok(true) => {}
                Ok(false) => {
                    violations.push(format!(
                        "{path} {op} {} failed (actual: {})",
                        format_value(expected),
                        format_value(&actual)
                    ));
                    if fail_fast {
                        break 'paths;
                    }
                }
                Err(CompareError::UnknownComparator(name)) => {
                    violations.push(format!("unknown comparator: {name}"));
                    if fail_fast {
                        break 'paths;
                    }
                }
                Err(CompareError::Failure(message)) => {
                    violations.push(format!("comparison error for {path}: {message}"));
                    if fail_fast {
                        break 'paths;
                    }
                }
            }
        }
    }

    RuleOutcome::from_violations(violations, evaluated)
}

/// Evaluate a regex rule. Exclude patterns run first and take precedence;
/// include patterns are ANY-match.
pub fn evaluate_regex(
    facts: &Facts,
    target: &str,
    include: &[String],
    exclude: &[String],
    case_sensitive: bool,
    full_match: bool,
) -> RuleOutcome {
    let Some(actual) = lookup(facts, target) else {
        return RuleOutcome::from_violations(
            vec![format!("missing target value: {target}")],
            BTreeMap::new(),
        );
    };
    let value = format_value(actual);

    let build = |pattern: &str| {
        RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .ok()
    };

    for pattern in exclude {
        let Some(compiled) = build(pattern) else {
            continue;
        };
        if compiled.is_match(&value) {
            return RuleOutcome::from_violations(
                vec![format!("excluded by pattern: {pattern}")],
                BTreeMap::new(),
            );
        }
    }

    if !include.is_empty() {
        let matched = include.iter().any(|pattern| {
            build(pattern).is_some_and(|compiled| {
                if full_match {
                    compiled
                        .find(&value)
                        .is_some_and(|m| m.start() == 0 && m.end() == value.len())
                } else {
                    compiled.is_match(&value)
                }
            })
        });
        if !matched {
            return RuleOutcome::from_violations(
                vec!["not matched by any include pattern".to_string()],
                BTreeMap::new(),
            );
        }
    }

    RuleOutcome::from_violations(Vec::new(), BTreeMap::new())
}

/// Evaluate a license rule against `license.id`.
pub fn evaluate_license(
    facts: &Facts,
    disallowed_licenses: &[String],
    allow_unknown: bool,
) -> RuleOutcome {
    let license_id = lookup(facts, "license.id").and_then(|v| v.as_str().map(|s| s.to_string()));
    let mut evaluated = BTreeMap::new();
    evaluated.insert(
        "license.id".to_string(),
        license_id.clone().map(Value::from).unwrap_or(Value::Null),
    );

    let Some(license_id) = license_id else {
        if allow_unknown {
            return RuleOutcome::from_violations(Vec::new(), evaluated);
        }
        return RuleOutcome::from_violations(
            vec!["license unknown and allow_unknown=false".to_string()],
            evaluated,
        );
    };

    if disallowed_licenses.iter().any(|d| d == &license_id) {
        return RuleOutcome::from_violations(
            vec![format!("license {license_id} is disallowed")],
            evaluated,
        );
    }

    RuleOutcome::from_violations(Vec::new(), evaluated)
}

/// Parameters of a linked-source rule.
pub struct LinkedRule<'a> {
    pub enabled: bool,
    pub require_source_repo: bool,
    pub require_version_in_source: bool,
    pub allowed_providers: &'a [String],
    pub version_tag_patterns: &'a [String],
    pub name_match: NameMatchMode,
    pub name_match_min_len: usize,
}

/// Evaluate a linked rule: source-repo presence, version-in-source, host
/// allowlist, and package/repo name agreement.
pub fn evaluate_linked(facts: &Facts, rule: &LinkedRule<'_>) -> RuleOutcome {
    if !rule.enabled {
        return RuleOutcome::from_violations(Vec::new(), BTreeMap::new());
    }

    let repo_url = lookup(facts, "repo_url_normalized")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let mut violations = Vec::new();
    let mut evaluated = BTreeMap::new();
    evaluated.insert(
        "repo_url_normalized".to_string(),
        repo_url.clone().map(Value::from).unwrap_or(Value::Null),
    );
    evaluated.insert(
        "version_found_in_source".to_string(),
        get_path(facts, "version_found_in_source")
            .cloned()
            .unwrap_or(Value::Null),
    );

    if rule.require_source_repo && repo_url.is_none() {
        violations.push("no source repository URL resolved (require_source_repo=true)".to_string());
    }

    if rule.require_version_in_source {
        let found = lookup(facts, "version_found_in_source")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !found {
            let version = lookup(facts, "resolved_version")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            let patterns = if rule.version_tag_patterns.is_empty() {
                "default".to_string()
            } else {
                rule.version_tag_patterns.join(", ")
            };
            violations.push(format!(
                "version not found in SCM (repo: {}, version: {version}, patterns tried: {patterns})",
                repo_url.as_deref().unwrap_or("unresolved"),
            ));
        }
    }

    if !rule.allowed_providers.is_empty() {
        if let Some(host) = lookup(facts, "repo_host").and_then(|v| v.as_str()) {
            if !rule.allowed_providers.iter().any(|p| p == host) {
                violations.push(format!("SCM provider '{host}' is not allowed"));
            }
        }
    }

    if rule.name_match != NameMatchMode::None {
        match &repo_url {
            None => {
                violations.push(
                    "name match requested but no source repository URL resolved".to_string(),
                );
            }
            Some(url) => {
                let package_name = lookup(facts, "package_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let repo_name = url.rsplit('/').next().unwrap_or("").to_string();
                let ok = match rule.name_match {
                    NameMatchMode::Exact => package_name == repo_name,
                    NameMatchMode::Partial => {
                        longest_common_substring(&package_name, &repo_name)
                            >= rule.name_match_min_len
                    }
                    NameMatchMode::None => true,
                };
                if !ok {
                    let mode = match rule.name_match {
                        NameMatchMode::Exact => "exact",
                        _ => "partial",
                    };
                    violations.push(format!(
                        "package/repository name mismatch (mode={mode}): package='{package_name}' repo='{repo_name}'"
                    ));
                }
            }
        }
    }

    RuleOutcome::from_violations(violations, evaluated)
}

fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut best = 0;
    let mut row = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        let mut prev_diag = 0;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag + 1
            } else {
                0
            };
            best = best.max(row[j]);
            prev_diag = tmp;
        }
    }
    best
}
