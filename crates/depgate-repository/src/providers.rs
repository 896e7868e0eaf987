//! Common surface for repository hosting providers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use depgate_core::package::RepoHost;

use crate::github::GitHubClient;
use crate::gitlab::GitLabClient;

/// Providers DepGate can validate against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Github,
    Gitlab,
    Unknown,
}

/// Map a normalized host classification to a provider.
pub fn map_host_to_type(host: RepoHost) -> ProviderType {
    match host {
        RepoHost::Github => ProviderType::Github,
        RepoHost::Gitlab => ProviderType::Gitlab,
        RepoHost::Other => ProviderType::Unknown,
    }
}

/// Repository-level metadata common to all providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub stars: Option<u64>,
    pub forks: Option<u64>,
    pub open_issues: Option<u64>,
    pub last_activity_at: Option<String>,
}

/// A tag or release name, reduced to the only attribute matching needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOrRelease {
    pub name: String,
}

impl TagOrRelease {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// REST adapter over one hosting provider.
///
/// All calls are best-effort: `None`/empty means the provider could not
/// answer, and the caller records the failure without aborting the package.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn get_repo_info(&self, owner: &str, repo: &str) -> Option<RepoInfo>;

    async fn get_contributors_count(&self, owner: &str, repo: &str) -> Option<u64>;

    async fn get_releases(&self, owner: &str, repo: &str) -> Vec<TagOrRelease>;

    async fn get_tags(&self, owner: &str, repo: &str) -> Vec<TagOrRelease>;
}

/// Construct the provider client for a host, if one exists.
pub fn provider_for(host: RepoHost, client: &Client) -> Option<Box<dyn Provider>> {
    match map_host_to_type(host) {
        ProviderType::Github => Some(Box::new(GitHubClient::new(client.clone()))),
        ProviderType::Gitlab => Some(Box::new(GitLabClient::new(client.clone()))),
        ProviderType::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_mapping() {
        assert_eq!(map_host_to_type(RepoHost::Github), ProviderType::Github);
        assert_eq!(map_host_to_type(RepoHost::Gitlab), ProviderType::Gitlab);
        assert_eq!(map_host_to_type(RepoHost::Other), ProviderType::Unknown);
    }

    #[test]
    fn unknown_host_has_no_provider() {
        let client = Client::new();
        assert!(provider_for(RepoHost::Other, &client).is_none());
        assert!(provider_for(RepoHost::Github, &client).is_some());
    }
}
