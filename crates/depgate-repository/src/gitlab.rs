//! GitLab REST v4 adapter.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Deserialize;

use crate::providers::{Provider, RepoInfo, TagOrRelease};

const API_BASE: &str = "https://gitlab.com/api/v4";
const PER_PAGE: usize = 100;

/// GitLab API client. Reads `GITLAB_TOKEN` for authenticated rate limits.
pub struct GitLabClient {
    client: Client,
    base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectPayload {
    star_count: Option<u64>,
    forks_count: Option<u64>,
    open_issues_count: Option<u64>,
    last_activity_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    tag_name: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagPayload {
    name: String,
}

impl GitLabClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base: API_BASE.to_string(),
            token: std::env::var("GITLAB_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
        }
    }

    /// Point the client at a different API base (test servers).
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// GitLab addresses projects by URL-encoded `owner/repo`.
    fn project_id(owner: &str, repo: &str) -> String {
        utf8_percent_encode(&format!("{owner}/{repo}"), NON_ALPHANUMERIC).to_string()
    }

    async fn get(&self, path: &str) -> Option<reqwest::Response> {
        let mut request = self.client.get(format!("{}{path}", self.base));
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }
        let response = request.send().await.ok()?;
        if response.status().is_success() {
            Some(response)
        } else {
            tracing::debug!(path, status = %response.status(), "gitlab request failed");
            None
        }
    }
}

#[async_trait]
impl Provider for GitLabClient {
    async fn get_repo_info(&self, owner: &str, repo: &str) -> Option<RepoInfo> {
        let id = Self::project_id(owner, repo);
        let response = self.get(&format!("/projects/{id}")).await?;
        let payload: ProjectPayload = response.json().await.ok()?;
        Some(RepoInfo {
            stars: payload.star_count,
            forks: payload.forks_count,
            open_issues: payload.open_issues_count,
            last_activity_at: payload.last_activity_at,
        })
    }

    async fn get_contributors_count(&self, owner: &str, repo: &str) -> Option<u64> {
        let id = Self::project_id(owner, repo);
        let response = self
            .get(&format!(
                "/projects/{id}/repository/contributors?per_page={PER_PAGE}"
            ))
            .await?;
        let payload: Vec<serde_json::Value> = response.json().await.ok()?;
        Some(payload.len() as u64)
    }

    async fn get_releases(&self, owner: &str, repo: &str) -> Vec<TagOrRelease> {
        let id = Self::project_id(owner, repo);
        let Some(response) = self
            .get(&format!("/projects/{id}/releases?per_page={PER_PAGE}"))
            .await
        else {
            return Vec::new();
        };
        let payload: Vec<ReleasePayload> = match response.json().await {
            Ok(payload) => payload,
            Err(_) => return Vec::new(),
        };
        payload
            .into_iter()
            .filter_map(|release| release.tag_name.or(release.name))
            .map(TagOrRelease::new)
            .collect()
    }

    async fn get_tags(&self, owner: &str, repo: &str) -> Vec<TagOrRelease> {
        let id = Self::project_id(owner, repo);
        let Some(response) = self
            .get(&format!(
                "/projects/{id}/repository/tags?per_page={PER_PAGE}"
            ))
            .await
        else {
            return Vec::new();
        };
        let payload: Vec<TagPayload> = match response.json().await {
            Ok(payload) => payload,
            Err(_) => return Vec::new(),
        };
        payload
            .into_iter()
            .map(|tag| TagOrRelease::new(tag.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_is_percent_encoded() {
        assert_eq!(GitLabClient::project_id("inkscape", "inkscape"), "inkscape%2Finkscape");
        assert_eq!(GitLabClient::project_id("a.b", "c-d"), "a%2Eb%2Fc%2Dd");
    }
}
