//! PyPI enrichment: project URLs, Read-the-Docs redirection, validation.

use reqwest::Client;
use serde_json::Value;

use depgate_core::package::{Package, RepoError};
use depgate_repository::providers::provider_for;
use depgate_repository::rtd;
use depgate_repository::url_normalize::normalize_repo_url;
use depgate_repository::validation::ProviderValidationService;
use depgate_repository::version_match::VersionMatcher;

/// `project_urls` keys consulted, in priority order.
const URL_KEYS: &[&str] = &[
    "Source",
    "Source Code",
    "Repository",
    "Homepage",
    "Documentation",
];

/// Candidate URLs with the provenance key that produced each.
fn candidate_urls(info: &Value) -> Vec<(String, String)> {
    let mut candidates = Vec::new();

    if let Some(project_urls) = info.get("project_urls").and_then(Value::as_object) {
        for key in URL_KEYS {
            if let Some(url) = project_urls.get(*key).and_then(Value::as_str) {
                if !url.trim().is_empty() {
                    candidates.push((
                        url.trim().to_string(),
                        format!("pypi_project_urls.{key}"),
                    ));
                }
            }
        }
    }

    if let Some(url) = info.get("home_page").and_then(Value::as_str) {
        if !url.trim().is_empty() && !candidates.iter().any(|(u, _)| u == url.trim()) {
            candidates.push((url.trim().to_string(), "pypi_home_page".to_string()));
        }
    }

    candidates
}

/// Discover and validate the source repository for a PyPI package.
///
/// Documentation URLs on `readthedocs.{io,org}` are resolved to the
/// backing SCM URL through the RTD API before normalization.
pub async fn enrich_with_repo(client: &Client, pkg: &mut Package, info: &Value, version: &str) {
    let candidates = candidate_urls(info);
    if candidates.is_empty() {
        return;
    }
    pkg.repo_present_in_registry = Some(true);

    let mut repo_errors: Vec<RepoError> = Vec::new();

    for (raw_url, provenance_key) in candidates {
        let mut effective_url = raw_url.clone();

        if let Some(slug) = rtd::infer_rtd_slug(&raw_url) {
            match rtd::resolve_rtd_repo(client, &slug).await {
                Some(resolved) => {
                    pkg.provenance.insert("rtd_slug".to_string(), slug);
                    pkg.provenance
                        .insert("rtd_source_url".to_string(), resolved.clone());
                    effective_url = resolved;
                }
                None => {
                    repo_errors.push(RepoError {
                        url: raw_url.clone(),
                        error_type: "network".to_string(),
                        message: "Read-the-Docs project lookup failed".to_string(),
                    });
                    continue;
                }
            }
        }

        let Some(normalized) = normalize_repo_url(&effective_url, None) else {
            repo_errors.push(RepoError {
                url: effective_url,
                error_type: "parse".to_string(),
                message: "unparseable repository URL".to_string(),
            });
            continue;
        };

        pkg.provenance.insert(provenance_key.clone(), raw_url.clone());
        pkg.repo_url_normalized = Some(normalized.normalized_url.clone());
        pkg.repo_host = Some(normalized.host);

        let Some(provider) = provider_for(normalized.host, client) else {
            continue;
        };
        let validated = ProviderValidationService::validate_and_populate(
            pkg,
            &normalized,
            version,
            provider.as_ref(),
            &VersionMatcher::new(),
        )
        .await;

        if validated && pkg.repo_exists == Some(true) {
            pkg.repo_resolved = Some(true);
            break;
        }
        repo_errors.push(RepoError {
            url: raw_url,
            error_type: "network".to_string(),
            message: "repository lookup failed".to_string(),
        });
    }

    if !repo_errors.is_empty() {
        pkg.repo_errors = repo_errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_keys_outrank_homepage_and_docs() {
        let info = json!({
            "project_urls": {
                "Documentation": "https://pkg.readthedocs.io/",
                "Homepage": "https://example.com",
                "Source": "https://github.com/owner/repo"
            }
        });
        let candidates = candidate_urls(&info);
        assert_eq!(candidates[0].0, "https://github.com/owner/repo");
        assert_eq!(candidates[0].1, "pypi_project_urls.Source");
        assert!(candidates
            .iter()
            .any(|(_, k)| k == "pypi_project_urls.Documentation"));
    }

    #[test]
    fn home_page_field_is_a_fallback() {
        let info = json!({"home_page": "https://github.com/owner/repo"});
        let candidates = candidate_urls(&info);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].1, "pypi_home_page");
    }

    #[test]
    fn empty_metadata_yields_no_candidates() {
        assert!(candidate_urls(&json!({})).is_empty());
    }
}
