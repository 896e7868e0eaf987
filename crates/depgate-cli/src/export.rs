//! Result serialization: stable CSV columns and nested JSON.

use std::path::Path;

use serde_json::{json, Value};

use depgate_core::package::Package;
use depgate_util::errors::DepGateError;

/// Stable CSV header set. The first twelve columns are the legacy shape;
/// resolution fields and the trailing five `repo_*` columns follow.
pub const CSV_HEADERS: [&str; 20] = [
    "Package Name",
    "Package Type",
    "Exists on External",
    "Org/Group ID",
    "Score",
    "Version Count",
    "Timestamp",
    "Risk: Missing",
    "Risk: Low Score",
    "Risk: Min Versions",
    "Risk: Too New",
    "Risk: Any Risks",
    "requested_spec",
    "resolved_version",
    "resolution_mode",
    "repo_stars",
    "repo_contributors",
    "repo_last_activity",
    "repo_present_in_registry",
    "repo_version_match",
];

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// One CSV row per package, aligned with [`CSV_HEADERS`]. Missing values
/// are empty strings.
pub fn csv_rows(packages: &[Package]) -> Vec<Vec<String>> {
    packages
        .iter()
        .map(|pkg| {
            // repo_present_in_registry blanks out when nothing was found
            // at all, matching the legacy export shape.
            let present = match (pkg.repo_present_in_registry, &pkg.repo_url_normalized) {
                (Some(false), None) => String::new(),
                (present, _) => cell(present),
            };
            vec![
                pkg.name.clone(),
                pkg.ecosystem.to_string(),
                cell(pkg.exists),
                cell(pkg.org_id.clone()),
                cell(pkg.heuristic_score),
                cell(pkg.version_count),
                cell(pkg.release_timestamp_ms),
                cell(pkg.risk_missing),
                cell(pkg.risk_low_score),
                cell(pkg.risk_min_versions),
                cell(pkg.risk_too_new),
                pkg.has_risk().to_string(),
                cell(pkg.requested_spec.clone()),
                cell(pkg.resolved_version.clone()),
                cell(pkg.resolution_mode.map(|m| m.as_str().to_string())),
                cell(pkg.repo_stars),
                cell(pkg.repo_contributors),
                cell(pkg.repo_last_activity_at.clone()),
                present,
                cell(pkg.repo_version_match.as_ref().map(|m| m.matched)),
            ]
        })
        .collect()
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line(row: &[String]) -> String {
    row.iter()
        .map(|field| csv_escape(field))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render the full CSV document.
pub fn render_csv(packages: &[Package]) -> String {
    let mut out = String::new();
    out.push_str(&csv_line(
        &CSV_HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>(),
    ));
    out.push('\n');
    for row in csv_rows(packages) {
        out.push_str(&csv_line(&row));
        out.push('\n');
    }
    out
}

/// Parse a CSV document back into rows (quoting-aware), header included.
pub fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        let mut row = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => {
                    row.push(std::mem::take(&mut field));
                }
                other => field.push(other),
            }
        }
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Nested JSON export, one object per package.
pub fn render_json(packages: &[Package]) -> Value {
    let items: Vec<Value> = packages
        .iter()
        .map(|pkg| {
            json!({
                "name": pkg.name,
                "type": pkg.ecosystem.as_str(),
                "org_id": pkg.org_id,
                "exists": pkg.exists,
                "score": pkg.heuristic_score,
                "version_count": pkg.version_count,
                "timestamp": pkg.release_timestamp_ms,
                "weekly_downloads": pkg.weekly_downloads,
                "requested_spec": pkg.requested_spec,
                "resolved_version": pkg.resolved_version,
                "resolution_mode": pkg.resolution_mode.map(|m| m.as_str()),
                "candidate_count": pkg.candidate_count,
                "repo": {
                    "url_normalized": pkg.repo_url_normalized,
                    "host": pkg.repo_host.map(|h| h.as_str()),
                    "present_in_registry": pkg.repo_present_in_registry,
                    "resolved": pkg.repo_resolved,
                    "exists": pkg.repo_exists,
                    "stars": pkg.repo_stars,
                    "contributors": pkg.repo_contributors,
                    "forks": pkg.repo_forks,
                    "open_issues": pkg.repo_open_issues,
                    "last_activity_at": pkg.repo_last_activity_at,
                    "version_match": pkg.repo_version_match,
                    "errors": pkg.repo_errors,
                },
                "license": pkg.license,
                "trust": {
                    "registry_signature_present": pkg.registry_signature_present,
                    "provenance_present": pkg.provenance_present,
                    "provenance_url": pkg.provenance_url,
                    "registry_signature_regressed": pkg.registry_signature_regressed,
                    "provenance_regressed": pkg.provenance_regressed,
                    "score": pkg.trust_score,
                    "previous_score": pkg.previous_trust_score,
                    "score_delta": pkg.trust_score_delta,
                    "score_decreased": pkg.trust_score_decreased,
                },
                "risk": {
                    "missing": pkg.risk_missing,
                    "low_score": pkg.risk_low_score,
                    "min_versions": pkg.risk_min_versions,
                    "too_new": pkg.risk_too_new,
                    "provenance_regression": pkg.risk_provenance_regression,
                    "registry_signature_regression": pkg.risk_registry_signature_regression,
                    "score_decrease": pkg.risk_score_decrease,
                    "any_risks": pkg.has_risk(),
                },
                "policy": {
                    "decision": pkg.policy_decision.map(|d| d.as_str()),
                    "violated_rules": pkg.policy_violated_rules,
                    "evaluated_metrics": pkg.policy_evaluated_metrics,
                },
                "provenance": pkg.provenance,
            })
        })
        .collect();
    Value::Array(items)
}

/// Write packages to disk in the requested format.
pub fn export(
    packages: &[Package],
    path: &Path,
    format: crate::cli::OutputFormat,
) -> Result<(), DepGateError> {
    let body = match format {
        crate::cli::OutputFormat::Csv => render_csv(packages),
        crate::cli::OutputFormat::Json => {
            let mut body = serde_json::to_string_pretty(&render_json(packages))
                .map_err(|e| DepGateError::Generic {
                    message: format!("JSON export failed: {e}"),
                })?;
            body.push('\n');
            body
        }
    };
    std::fs::write(path, body).map_err(|e| DepGateError::Manifest {
        message: format!("cannot write {}: {e}", path.display()),
    })?;
    tracing::info!(path = %path.display(), "results exported");
    Ok(())
}
