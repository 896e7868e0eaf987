//! Upstream forwarding with an SSRF-safe redirect allowlist.
//!
//! Redirects are handled manually: every `Location` is resolved against
//! the current URL and only targets whose host equals (or is a subdomain
//! of) the origin upstream host or a per-registry allowlist entry are
//! followed. Everything else is rejected before a request is sent.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;
use url::Url;

use depgate_core::config::ProxySettings;
use depgate_core::ecosystem::Ecosystem;
use depgate_util::errors::DepGateError;

const MAX_REDIRECTS: usize = 5;
const DEFAULT_USER_AGENT: &str = "depgate-proxy/0.2";

/// Hop-by-hop headers stripped before forwarding.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Response headers preserved toward the client, in canonical casing.
const FORWARDED_RESPONSE_HEADERS: &[(&str, &str)] = &[
    ("accept-ranges", "Accept-Ranges"),
    ("cache-control", "Cache-Control"),
    ("content-disposition", "Content-Disposition"),
    ("content-encoding", "Content-Encoding"),
    ("content-length", "Content-Length"),
    ("content-range", "Content-Range"),
    ("content-type", "Content-Type"),
    ("etag", "ETag"),
    ("last-modified", "Last-Modified"),
    ("location", "Location"),
    ("retry-after", "Retry-After"),
    ("vary", "Vary"),
    ("www-authenticate", "WWW-Authenticate"),
];

/// Why an upstream request could not be completed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Redirect blocked by allowlist")]
    RedirectBlocked,
    #[error("Redirect not allowed for non-GET/HEAD request")]
    RedirectMethodNotAllowed,
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("no upstream configured for registry")]
    MissingUpstream,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for forwarding requests to upstream registries.
pub struct UpstreamClient {
    client: Client,
    upstreams: HashMap<Ecosystem, String>,
    redirect_allowlist: HashMap<Ecosystem, Vec<String>>,
}

impl UpstreamClient {
    /// Build from proxy settings; one connection pool per process.
    pub fn new(settings: &ProxySettings) -> Result<Self, DepGateError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .redirect(Policy::none())
            .build()
            .map_err(|e| DepGateError::Network {
                message: format!("failed to create upstream client: {e}"),
            })?;

        let upstreams = HashMap::from([
            (Ecosystem::Npm, settings.upstream_npm.trim_end_matches('/').to_string()),
            (Ecosystem::Pypi, settings.upstream_pypi.trim_end_matches('/').to_string()),
            (Ecosystem::Maven, settings.upstream_maven.trim_end_matches('/').to_string()),
            (Ecosystem::Nuget, settings.upstream_nuget.trim_end_matches('/').to_string()),
        ]);

        let redirect_allowlist = HashMap::from([
            (Ecosystem::Npm, vec![]),
            (Ecosystem::Pypi, vec!["files.pythonhosted.org".to_string()]),
            (Ecosystem::Maven, vec!["repo.maven.apache.org".to_string()]),
            (Ecosystem::Nuget, vec!["globalcdn.nuget.org".to_string()]),
        ]);

        Ok(Self {
            client,
            upstreams,
            redirect_allowlist,
        })
    }

    pub fn upstream_for(&self, registry: Ecosystem) -> Option<&str> {
        self.upstreams
            .get(&registry)
            .map(String::as_str)
            .filter(|base| !base.is_empty())
    }

    /// Join the configured base with the request path, de-duplicating
    /// `/maven2` when the base already ends with it.
    pub fn build_url(&self, registry: Ecosystem, path: &str) -> Option<String> {
        let base = self.upstream_for(registry)?;
        let mut request_path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        if registry == Ecosystem::Maven
            && base.ends_with("/maven2")
            && request_path.starts_with("/maven2")
        {
            request_path = request_path["/maven2".len()..].to_string();
            if request_path.is_empty() {
                request_path = "/".to_string();
            }
        }
        if !request_path.starts_with('/') {
            request_path = format!("/{request_path}");
        }

        Some(format!("{base}{request_path}"))
    }

    /// Strip hop-by-hop headers (plus anything named in the request's
    /// `Connection` token list) and default `User-Agent`/`Accept`.
    pub fn build_request_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
        let connection_tokens: Vec<String> = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("connection"))
            .map(|(_, value)| {
                value
                    .split(',')
                    .map(|token| token.trim().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        let mut out: Vec<(String, String)> = headers
            .iter()
            .filter(|(name, _)| {
                let lower = name.to_lowercase();
                !HOP_BY_HOP.contains(&lower.as_str()) && !connection_tokens.contains(&lower)
            })
            .cloned()
            .collect();

        if !out.iter().any(|(n, _)| n.eq_ignore_ascii_case("user-agent")) {
            out.push(("User-Agent".to_string(), DEFAULT_USER_AGENT.to_string()));
        }
        if !out.iter().any(|(n, _)| n.eq_ignore_ascii_case("accept")) {
            out.push(("Accept".to_string(), "*/*".to_string()));
        }
        out
    }

    /// Cache key covering the URL plus the response-variant headers.
    pub fn cache_key(url: &str, request_headers: &[(String, String)]) -> String {
        let header = |wanted: &str| {
            request_headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value.as_str())
                .unwrap_or("")
        };
        format!(
            "{url}\naccept={}\naccept-encoding={}",
            header("accept"),
            header("accept-encoding")
        )
    }

    /// A request is cacheable unless it carries credentials or a range.
    pub fn is_cacheable_request(request_headers: &[(String, String)]) -> bool {
        !request_headers.iter().any(|(name, _)| {
            let lower = name.to_lowercase();
            lower == "authorization" || lower == "cookie" || lower == "range"
        })
    }

    /// A response is cacheable unless it sets cookies, opts out via
    /// cache-control/pragma, or varies on anything beyond accept headers.
    pub fn is_cacheable_response(response_headers: &[(String, String)]) -> bool {
        let value_of = |wanted: &str| {
            response_headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value.to_lowercase())
        };

        if response_headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("set-cookie"))
        {
            return false;
        }
        if let Some(cache_control) = value_of("cache-control") {
            if ["no-store", "no-cache", "private"]
                .iter()
                .any(|token| cache_control.contains(token))
            {
                return false;
            }
        }
        if let Some(pragma) = value_of("pragma") {
            if pragma.contains("no-cache") {
                return false;
            }
        }
        if let Some(vary) = value_of("vary") {
            for token in vary.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if token == "*" || (token != "accept" && token != "accept-encoding") {
                    return false;
                }
            }
        }
        true
    }

    /// Project upstream response headers onto the forwarded set.
    pub fn filter_response_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
        let mut filtered = Vec::new();
        for (lower, canonical) in FORWARDED_RESPONSE_HEADERS {
            for value in headers.get_all(*lower) {
                if let Ok(value) = value.to_str() {
                    filtered.push((canonical.to_string(), value.to_string()));
                }
            }
        }
        filtered
    }

    /// Longest-prefix match of a URL back to a configured registry.
    fn registry_for_url(&self, url: &str) -> Option<Ecosystem> {
        self.upstreams
            .iter()
            .filter(|(_, base)| !base.is_empty() && url.starts_with(base.as_str()))
            .max_by_key(|(_, base)| base.len())
            .map(|(registry, _)| *registry)
    }

    /// Validate a redirect target against the origin host and the
    /// per-registry allowlist.
    fn is_allowed_redirect(&self, source_url: &str, target_url: &str) -> bool {
        let Ok(target) = Url::parse(target_url) else {
            return false;
        };
        if !matches!(target.scheme(), "http" | "https") {
            return false;
        }
        let Some(target_host) = target.host_str().map(str::to_lowercase) else {
            return false;
        };

        let mut allowed_hosts: Vec<String> = Vec::new();
        match self.registry_for_url(source_url) {
            Some(registry) => {
                if let Some(host) = self
                    .upstream_for(registry)
                    .and_then(|base| Url::parse(base).ok())
                    .and_then(|u| u.host_str().map(str::to_lowercase))
                {
                    allowed_hosts.push(host);
                }
                if let Some(extra) = self.redirect_allowlist.get(&registry) {
                    allowed_hosts.extend(extra.iter().map(|h| h.to_lowercase()));
                }
            }
            None => {
                if let Some(host) = Url::parse(source_url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_lowercase))
                {
                    allowed_hosts.push(host);
                }
            }
        }

        allowed_hosts
            .iter()
            .any(|host| target_host == *host || target_host.ends_with(&format!(".{host}")))
    }

    /// Issue a request, following at most five allowlisted redirects.
    ///
    /// Non-GET/HEAD methods refuse 301/302/303 entirely; a 303 downgrades
    /// to GET and drops the body.
    pub async fn request(
        &self,
        url: &str,
        method: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut current_url = url.to_string();
        let mut current_method =
            Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET);
        let mut current_body = body;

        for _ in 0..=MAX_REDIRECTS {
            let mut request = self.client.request(current_method.clone(), &current_url);
            for (name, value) in headers {
                request = request.header(name, value);
            }
            if let Some(body) = &current_body {
                request = request.body(body.clone());
            }

            let response = request.send().await?;
            let status = response.status();
            if !status.is_redirection() {
                return Ok(response);
            }
            if !matches!(
                status,
                StatusCode::MOVED_PERMANENTLY
                    | StatusCode::FOUND
                    | StatusCode::SEE_OTHER
                    | StatusCode::TEMPORARY_REDIRECT
                    | StatusCode::PERMANENT_REDIRECT
            ) {
                return Ok(response);
            }

            let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
            else {
                return Ok(response);
            };

            let next_url = match Url::parse(&current_url)
                .ok()
                .and_then(|base| base.join(&location).ok())
            {
                Some(joined) => joined.to_string(),
                None => return Err(UpstreamError::RedirectBlocked),
            };

            if !self.is_allowed_redirect(&current_url, &next_url) {
                tracing::warn!(from = %current_url, to = %next_url, "redirect blocked");
                return Err(UpstreamError::RedirectBlocked);
            }

            let method_changing = matches!(
                status,
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
            );
            if current_method != Method::GET && current_method != Method::HEAD && method_changing {
                return Err(UpstreamError::RedirectMethodNotAllowed);
            }
            if status == StatusCode::SEE_OTHER {
                current_method = Method::GET;
                current_body = None;
            }

            current_url = next_url;
        }

        Err(UpstreamError::TooManyRedirects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> UpstreamClient {
        UpstreamClient::new(&ProxySettings::default()).unwrap()
    }

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn build_url_dedupes_maven2() {
        let upstream = client();
        assert_eq!(
            upstream
                .build_url(Ecosystem::Maven, "/maven2/com/x/y/maven-metadata.xml")
                .unwrap(),
            "https://repo1.maven.org/maven2/com/x/y/maven-metadata.xml"
        );
        assert_eq!(
            upstream.build_url(Ecosystem::Npm, "lodash").unwrap(),
            "https://registry.npmjs.org/lodash"
        );
    }

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let out = UpstreamClient::build_request_headers(&headers(&[
            ("Connection", "keep-alive, X-Custom"),
            ("Keep-Alive", "timeout=5"),
            ("Transfer-Encoding", "chunked"),
            ("Host", "localhost:8080"),
            ("X-Custom", "dropped-by-connection-token"),
            ("Accept", "application/json"),
        ]));
        let names: Vec<&str> = out.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"Accept"));
        assert!(names.contains(&"User-Agent"));
        assert!(!names.iter().any(|n| n.eq_ignore_ascii_case("connection")));
        assert!(!names.iter().any(|n| n.eq_ignore_ascii_case("host")));
        assert!(!names.iter().any(|n| n.eq_ignore_ascii_case("x-custom")));
    }

    #[test]
    fn request_cacheability() {
        assert!(UpstreamClient::is_cacheable_request(&headers(&[(
            "Accept", "*/*"
        )])));
        for blocked in ["Authorization", "Cookie", "Range"] {
            assert!(!UpstreamClient::is_cacheable_request(&headers(&[(
                blocked, "x"
            )])));
        }
    }

    #[test]
    fn response_cacheability() {
        assert!(UpstreamClient::is_cacheable_response(&headers(&[(
            "Content-Type",
            "application/json"
        )])));
        assert!(!UpstreamClient::is_cacheable_response(&headers(&[(
            "Set-Cookie",
            "session=1"
        )])));
        assert!(!UpstreamClient::is_cacheable_response(&headers(&[(
            "Cache-Control",
            "no-store"
        )])));
        assert!(!UpstreamClient::is_cacheable_response(&headers(&[(
            "Pragma", "no-cache"
        )])));
        assert!(!UpstreamClient::is_cacheable_response(&headers(&[(
            "Vary", "*"
        )])));
        assert!(!UpstreamClient::is_cacheable_response(&headers(&[(
            "Vary",
            "User-Agent"
        )])));
        assert!(UpstreamClient::is_cacheable_response(&headers(&[(
            "Vary",
            "Accept, Accept-Encoding"
        )])));
    }

    #[test]
    fn cache_key_includes_variant_headers() {
        let key = UpstreamClient::cache_key(
            "https://registry.npmjs.org/lodash",
            &headers(&[("Accept", "application/json"), ("Accept-Encoding", "gzip")]),
        );
        assert!(key.contains("accept=application/json"));
        assert!(key.contains("accept-encoding=gzip"));
    }

    #[test]
    fn redirect_allowlist_blocks_metadata_host() {
        let upstream = client();
        // PyPI may redirect to files.pythonhosted.org...
        assert!(upstream.is_allowed_redirect(
            "https://pypi.org/simple/requests/",
            "https://files.pythonhosted.org/packages/x/y/requests-2.31.0.tar.gz"
        ));
        // ...but never to a link-local metadata service.
        assert!(!upstream.is_allowed_redirect(
            "https://pypi.org/simple/requests/",
            "http://169.254.169.254/latest/meta-data/"
        ));
        // Subdomains of the origin host are fine.
        assert!(upstream.is_allowed_redirect(
            "https://registry.npmjs.org/lodash",
            "https://cdn.registry.npmjs.org/lodash"
        ));
        // Other schemes are always rejected.
        assert!(!upstream.is_allowed_redirect(
            "https://pypi.org/simple/requests/",
            "ftp://files.pythonhosted.org/x"
        ));
    }
}
