//! Read-the-Docs slug inference and repository resolution.
//!
//! PyPI `project_urls` frequently point at documentation sites instead of
//! the source repository. When a candidate lives on
//! `{slug}.readthedocs.io|org` (or `readthedocs.org/projects/{slug}`), the
//! RTD v3 API can hand back the real SCM URL.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

const RTD_API_BASE: &str = "https://readthedocs.org/api/v3";

#[derive(Debug, Deserialize)]
struct ProjectPayload {
    repository: Option<RepositoryPayload>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    url: Option<String>,
}

/// Infer the RTD project slug from a documentation URL, if it is one.
pub fn infer_rtd_slug(raw_url: &str) -> Option<String> {
    let parsed = Url::parse(raw_url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();

    for domain in [".readthedocs.io", ".readthedocs.org"] {
        if let Some(slug) = host.strip_suffix(domain) {
            if !slug.is_empty() && !slug.contains('.') {
                return Some(slug.to_string());
            }
        }
    }

    if host == "readthedocs.org" || host == "readthedocs.io" {
        let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
        if segments.next() == Some("projects") {
            return segments.next().map(|slug| slug.to_string());
        }
    }

    None
}

/// Resolve an RTD slug to its backing repository URL via the v3 API.
pub async fn resolve_rtd_repo(client: &Client, slug: &str) -> Option<String> {
    resolve_rtd_repo_at(client, slug, RTD_API_BASE).await
}

/// Like [`resolve_rtd_repo`] with an explicit API base (test servers).
pub async fn resolve_rtd_repo_at(client: &Client, slug: &str, api_base: &str) -> Option<String> {
    let url = format!("{}/projects/{slug}/", api_base.trim_end_matches('/'));
    let response = client.get(&url).send().await.ok()?;
    if !response.status().is_success() {
        tracing::debug!(slug, status = %response.status(), "rtd project lookup failed");
        return None;
    }
    let payload: ProjectPayload = response.json().await.ok()?;
    payload
        .repository?
        .url
        .filter(|repo_url| !repo_url.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_slug() {
        assert_eq!(
            infer_rtd_slug("https://rtdpkg.readthedocs.io/").as_deref(),
            Some("rtdpkg")
        );
        assert_eq!(
            infer_rtd_slug("https://requests.readthedocs.org/en/latest/").as_deref(),
            Some("requests")
        );
    }

    #[test]
    fn projects_path_slug() {
        assert_eq!(
            infer_rtd_slug("https://readthedocs.org/projects/rtdpkg/").as_deref(),
            Some("rtdpkg")
        );
    }

    #[test]
    fn non_rtd_urls_are_ignored() {
        assert_eq!(infer_rtd_slug("https://github.com/owner/repo"), None);
        assert_eq!(infer_rtd_slug("https://readthedocs.org/"), None);
        assert_eq!(infer_rtd_slug("not a url"), None);
    }
}
