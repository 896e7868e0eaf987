//! GitHub REST v3 adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::providers::{Provider, RepoInfo, TagOrRelease};

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// GitHub API client. Reads `GITHUB_TOKEN` for authenticated rate limits.
pub struct GitHubClient {
    client: Client,
    base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    stargazers_count: Option<u64>,
    forks_count: Option<u64>,
    open_issues_count: Option<u64>,
    pushed_at: Option<String>,
    updated_at: Option<String>,
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

impl GitHubClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base: API_BASE.to_string(),
            token: std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
        }
    }

    /// Point the client at a different API base (test servers).
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    async fn get(&self, path: &str) -> Option<reqwest::Response> {
        let mut request = self
            .client
            .get(format!("{}{path}", self.base))
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.ok()?;
        if response.status().is_success() {
            Some(response)
        } else {
            tracing::debug!(path, status = %response.status(), "github request failed");
            None
        }
    }
}

/// Parse the `page=N` value out of a `Link` header's `rel="last"` entry.
fn last_page_from_link(link: &str) -> Option<u64> {
    for part in link.split(',') {
        if !part.contains("rel=\"last\"") {
            continue;
        }
        let url = part.split(';').next()?.trim();
        let url = url.trim_start_matches('<').trim_end_matches('>');
        for pair in url.split_once('?')?.1.split('&') {
            if let Some(value) = pair.strip_prefix("page=") {
                return value.parse().ok();
            }
        }
    }
    None
}

#[async_trait]
impl Provider for GitHubClient {
    async fn get_repo_info(&self, owner: &str, repo: &str) -> Option<RepoInfo> {
        let response = self.get(&format!("/repos/{owner}/{repo}")).await?;
        let payload: RepoPayload = response.json().await.ok()?;
        Some(RepoInfo {
            stars: payload.stargazers_count,
            forks: payload.forks_count,
            open_issues: payload.open_issues_count,
            last_activity_at: payload.pushed_at.or(payload.updated_at),
        })
    }

    async fn get_contributors_count(&self, owner: &str, repo: &str) -> Option<u64> {
        let response = self
            .get(&format!(
                "/repos/{owner}/{repo}/contributors?per_page=1&anon=true"
            ))
            .await?;
        // With per_page=1 the last-page number in the Link header IS the
        // contributor count; a missing header means a single page.
        if let Some(link) = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
        {
            if let Some(count) = last_page_from_link(link) {
                return Some(count);
            }
        }
        let payload: Vec<serde_json::Value> = response.json().await.ok()?;
        Some(payload.len() as u64)
    }

    async fn get_releases(&self, owner: &str, repo: &str) -> Vec<TagOrRelease> {
        let Some(response) = self
            .get(&format!("/repos/{owner}/{repo}/releases?per_page={PER_PAGE}"))
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
        let Some(response) = self
            .get(&format!("/repos/{owner}/{repo}/tags?per_page={PER_PAGE}"))
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
    fn link_header_last_page() {
        let link = "<https://api.github.com/repos/o/r/contributors?per_page=1&page=2>; \
                    rel=\"next\", \
                    <https://api.github.com/repos/o/r/contributors?per_page=1&page=421>; \
                    rel=\"last\"";
        assert_eq!(last_page_from_link(link), Some(421));
    }

    #[test]
    fn link_header_without_last() {
        let link = "<https://api.github.com/x?page=2>; rel=\"next\"";
        assert_eq!(last_page_from_link(link), None);
    }
}
