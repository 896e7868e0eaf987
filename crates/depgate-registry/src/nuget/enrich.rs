//! NuGet enrichment: repository discovery, validation, version matching.

use reqwest::Client;

use depgate_core::package::{Package, RepoError};
use depgate_repository::providers::provider_for;
use depgate_repository::url_normalize::normalize_repo_url;
use depgate_repository::validation::ProviderValidationService;
use depgate_repository::version_match::VersionMatcher;

use super::client::NugetMetadata;

/// Discover and validate the source repository from normalized metadata.
///
/// `repositoryUrl` wins over `projectUrl`; the version used for matching
/// is the resolved one when set, else the registry's latest.
pub async fn enrich_with_repo(client: &Client, pkg: &mut Package, meta: &NugetMetadata) {
    let mut candidates: Vec<(String, &'static str)> = Vec::new();
    if let Some(url) = &meta.repository_url {
        candidates.push((url.clone(), "nuget_repositoryUrl"));
    }
    if let Some(url) = &meta.project_url {
        candidates.push((url.clone(), "nuget_projectUrl"));
    }
    if candidates.is_empty() {
        return;
    }
    pkg.repo_present_in_registry = Some(true);

    let version = pkg.match_version(meta.latest_version.as_deref().unwrap_or(""));

    let mut repo_errors: Vec<RepoError> = Vec::new();

    for (candidate, provenance_key) in &candidates {
        let Some(normalized) = normalize_repo_url(candidate, None) else {
            repo_errors.push(RepoError {
                url: candidate.clone(),
                error_type: "parse".to_string(),
                message: "unparseable repository URL".to_string(),
            });
            continue;
        };

        pkg.provenance
            .insert(provenance_key.to_string(), candidate.clone());
        pkg.repo_url_normalized = Some(normalized.normalized_url.clone());
        pkg.repo_host = Some(normalized.host);

        let Some(provider) = provider_for(normalized.host, client) else {
            continue;
        };
        let validated = ProviderValidationService::validate_and_populate(
            pkg,
            &normalized,
            &version,
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
