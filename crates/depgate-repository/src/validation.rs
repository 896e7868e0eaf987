//! Shared validation flow for repository provider enrichment.

use depgate_core::package::Package;

use crate::providers::Provider;
use crate::url_normalize::RepoRef;
use crate::version_match::VersionMatcher;

/// Validates a candidate repository and populates the package record.
pub struct ProviderValidationService;

impl ProviderValidationService {
    /// Fetch repo info, contributor count, and releases (falling back to
    /// tags), then attempt a version match.
    ///
    /// Returns `true` when the repository exists and was validated; `false`
    /// leaves the package untouched so the caller can try the next
    /// candidate URL.
    pub async fn validate_and_populate(
        pkg: &mut Package,
        repo_ref: &RepoRef,
        version: &str,
        provider: &dyn Provider,
        matcher: &VersionMatcher,
    ) -> bool {
        let Some(info) = provider.get_repo_info(&repo_ref.owner, &repo_ref.repo).await else {
            return false;
        };

        pkg.repo_exists = Some(true);
        pkg.repo_stars = info.stars;
        pkg.repo_forks = info.forks;
        pkg.repo_open_issues = info.open_issues;
        pkg.repo_last_activity_at = info.last_activity_at;

        if let Some(contributors) = provider
            .get_contributors_count(&repo_ref.owner, &repo_ref.repo)
            .await
        {
            pkg.repo_contributors = Some(contributors);
        }

        let mut artifacts = provider.get_releases(&repo_ref.owner, &repo_ref.repo).await;
        if artifacts.is_empty() {
            artifacts = provider.get_tags(&repo_ref.owner, &repo_ref.repo).await;
        }

        if !artifacts.is_empty() {
            pkg.repo_version_match = Some(matcher.find_match(version, &artifacts));
        }

        true
    }
}
