//! npm enrichment: repository discovery, validation, and version matching.

use reqwest::Client;
use serde_json::Value;

use depgate_core::package::{Package, RepoError};
use depgate_repository::providers::provider_for;
use depgate_repository::url_normalize::normalize_repo_url;
use depgate_repository::validation::ProviderValidationService;
use depgate_repository::version_match::VersionMatcher;

/// Candidate repository URLs from a packument version, in priority order.
///
/// The `repository` field wins; `homepage` and `bugs.url` are fallbacks
/// only consulted when it is absent.
fn candidate_urls(version_info: &Value) -> (Vec<(String, &'static str)>, Option<String>) {
    let mut candidates = Vec::new();
    let mut directory = None;

    match version_info.get("repository") {
        Some(Value::String(url)) if !url.trim().is_empty() => {
            candidates.push((url.trim().to_string(), "npm_repository_field"));
        }
        Some(Value::Object(repo)) => {
            if let Some(url) = repo.get("url").and_then(Value::as_str) {
                if !url.trim().is_empty() {
                    candidates.push((url.trim().to_string(), "npm_repository_field"));
                }
            }
            directory = repo
                .get("directory")
                .and_then(Value::as_str)
                .map(|d| d.to_string());
        }
        _ => {}
    }

    if candidates.is_empty() {
        if let Some(url) = version_info.get("homepage").and_then(Value::as_str) {
            if !url.trim().is_empty() {
                candidates.push((url.trim().to_string(), "npm_homepage"));
            }
        }
        let bugs_url = match version_info.get("bugs") {
            Some(Value::String(url)) => Some(url.clone()),
            Some(Value::Object(bugs)) => bugs
                .get("url")
                .and_then(Value::as_str)
                .map(|u| u.to_string()),
            _ => None,
        };
        if let Some(url) = bugs_url {
            if !url.trim().is_empty() {
                candidates.push((url.trim().to_string(), "npm_bugs_url"));
            }
        }
    }

    (candidates, directory)
}

/// Discover, normalize, and validate the package's source repository.
///
/// `info_version` selects the packument version object to read metadata
/// from; `match_version` feeds tag matching (empty when an exact pin
/// failed to resolve, which disables matching).
pub async fn enrich_with_repo(
    client: &Client,
    pkg: &mut Package,
    packument: &Value,
    info_version: &str,
    match_version: &str,
) {
    let version_info = packument
        .get("versions")
        .and_then(|v| v.get(info_version))
        .unwrap_or(packument);

    let (candidates, directory) = candidate_urls(version_info);
    if candidates.is_empty() {
        return;
    }
    pkg.repo_present_in_registry = Some(true);

    let mut repo_errors: Vec<RepoError> = Vec::new();

    for (candidate, provenance_key) in &candidates {
        // The monorepo directory only applies to the repository field.
        let dir = if *provenance_key == "npm_repository_field" {
            directory.as_deref()
        } else {
            None
        };

        let Some(normalized) = normalize_repo_url(candidate, dir) else {
            repo_errors.push(RepoError {
                url: candidate.clone(),
                error_type: "parse".to_string(),
                message: "unparseable repository URL".to_string(),
            });
            continue;
        };

        pkg.provenance
            .insert(provenance_key.to_string(), candidate.clone());
        if let Some(dir) = &normalized.directory {
            pkg.provenance
                .insert("npm_repository_directory".to_string(), dir.clone());
        }

        pkg.repo_url_normalized = Some(normalized.normalized_url.clone());
        pkg.repo_host = Some(normalized.host);

        let Some(provider) = provider_for(normalized.host, client) else {
            continue;
        };
        let validated = ProviderValidationService::validate_and_populate(
            pkg,
            &normalized,
            match_version,
            provider.as_ref(),
            &VersionMatcher::new(),
        )
        .await;

        if validated && pkg.repo_exists == Some(true) {
            pkg.repo_resolved = Some(true);
            break;
        }
        repo_errors.push(RepoError {
            url: candidate.clone(),
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
    fn repository_field_takes_priority() {
        let info = json!({
            "repository": {"url": "git+https://github.com/babel/babel.git", "directory": "packages/babel-core"},
            "homepage": "https://babeljs.io",
            "bugs": {"url": "https://github.com/babel/babel/issues"}
        });
        let (candidates, directory) = candidate_urls(&info);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].1, "npm_repository_field");
        assert_eq!(directory.as_deref(), Some("packages/babel-core"));
    }

    #[test]
    fn fallbacks_used_when_repository_absent() {
        let info = json!({
            "homepage": "https://github.com/owner/site",
            "bugs": "https://github.com/owner/site/issues"
        });
        let (candidates, _) = candidate_urls(&info);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].1, "npm_homepage");
        assert_eq!(candidates[1].1, "npm_bugs_url");
    }

    #[test]
    fn string_repository_field() {
        let info = json!({"repository": "github.com/lodash/lodash"});
        let (candidates, directory) = candidate_urls(&info);
        assert_eq!(candidates[0].0, "github.com/lodash/lodash");
        assert!(directory.is_none());
    }
}
