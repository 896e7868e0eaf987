//! The proxy HTTP server: registry detection, parsing, gating, forwarding.

use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{boxed, Body, Full, StreamBody};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::oneshot;

use depgate_core::config::ProxySettings;
use depgate_core::ecosystem::Ecosystem;
use depgate_core::policy::{Decision, PolicyConfig, PolicyDecision};
use depgate_util::errors::{DepGateError, DepGateResult};

use crate::cache::{DecisionCache, ResponseCache};
use crate::evaluator::ProxyEvaluator;
use crate::request_parser::{ParsedRequest, RequestParser};
use crate::upstream::UpstreamClient;

/// Shared server state: caches, evaluator, parser, and upstream client.
pub struct ProxyState {
    settings: ProxySettings,
    parser: RequestParser,
    evaluator: ProxyEvaluator,
    upstream: UpstreamClient,
    decision_cache: Arc<DecisionCache>,
    response_cache: ResponseCache,
}

impl ProxyState {
    pub fn new(
        settings: ProxySettings,
        policy: Option<PolicyConfig>,
    ) -> Result<Arc<Self>, DepGateError> {
        let decision_cache = Arc::new(DecisionCache::new(Duration::from_secs(settings.cache_ttl)));
        let response_cache = ResponseCache::new(Duration::from_secs(settings.response_cache_ttl));
        let upstream = UpstreamClient::new(&settings)?;
        let evaluator = ProxyEvaluator::new(
            policy,
            settings.decision_mode,
            decision_cache.clone(),
        );
        Ok(Arc::new(Self {
            settings,
            parser: RequestParser::new(),
            evaluator,
            upstream,
            decision_cache,
            response_cache,
        }))
    }

    pub fn evaluator(&self) -> &ProxyEvaluator {
        &self.evaluator
    }

    fn cache_stats(&self) -> serde_json::Value {
        json!({
            "decision_cache": self.decision_cache.stats(),
            "response_cache": self.response_cache.stats(),
        })
    }
}

/// A bound, serving proxy; dropping the shutdown sender stops it.
pub struct RunningProxy {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl RunningProxy {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Drain in-flight requests and stop serving.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

fn ensure_bindable(settings: &ProxySettings) -> Result<(), DepGateError> {
    let is_loopback = settings.host == "localhost"
        || settings
            .host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false);
    if !is_loopback && !settings.allow_external {
        return Err(DepGateError::Config {
            message: format!(
                "refusing to bind non-loopback address {} without --allow-external",
                settings.host
            ),
        });
    }
    Ok(())
}

/// Bind the listener and start serving in a background task.
///
/// Binding port 0 reports the kernel-assigned port in `addr`.
pub async fn bind(state: Arc<ProxyState>) -> Result<RunningProxy, DepGateError> {
    ensure_bindable(&state.settings)?;

    let app = Router::new()
        .route("/_depgate/health", get(health))
        .fallback(handle_request)
        .with_state(state.clone());

    let listener = TcpListener::bind((state.settings.host.as_str(), state.settings.port))
        .map_err(|e| DepGateError::Network {
            message: format!(
                "cannot bind {}:{}: {e}",
                state.settings.host, state.settings.port
            ),
        })?;
    let addr = listener.local_addr().map_err(DepGateError::from)?;
    listener.set_nonblocking(true).map_err(DepGateError::from)?;

    let server = axum::Server::from_tcp(listener)
        .map_err(|e| DepGateError::Network {
            message: format!("cannot start server: {e}"),
        })?
        .serve(app.into_make_service());

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let graceful = server.with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });

    let handle = tokio::spawn(async move {
        if let Err(e) = graceful.await {
            tracing::error!(error = %e, "proxy server error");
        }
    });

    Ok(RunningProxy {
        addr,
        shutdown: Some(shutdown_tx),
        handle,
    })
}

/// Run the proxy until SIGINT/SIGTERM.
pub async fn run(settings: ProxySettings, policy: Option<PolicyConfig>) -> DepGateResult<()> {
    let state = ProxyState::new(settings, policy)?;
    let proxy = bind(state.clone()).await?;

    print_banner(&state, proxy.addr);

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining requests");
    proxy.shutdown().await;
    tracing::info!("proxy server stopped");
    Ok(())
}

fn print_banner(state: &ProxyState, addr: SocketAddr) {
    use depgate_util::progress::status;
    status("Listening", &format!("http://{addr} (decision mode: {})", state.evaluator.decision_mode()));
    status("Configure", &format!("npm config set registry http://{addr}"));
    status("Configure", &format!("pip config set global.index-url http://{addr}/simple"));
    status(
        "Configure",
        &format!("dotnet nuget add source http://{addr}/v3/index.json -n depgate"),
    );
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

async fn health(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "decision_mode": state.evaluator.decision_mode().as_str(),
        "cache": state.cache_stats(),
    }))
}

async fn handle_request(State(state): State<Arc<ProxyState>>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let path_qs = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).to_string(),
            )
        })
        .collect();

    let hint = detect_registry_hint(&headers, &path);
    let parsed = state.parser.parse(&path, hint);
    let registry = parsed.registry.or(hint);

    if parsed.package_name.is_empty() {
        // Nothing identifiable: pass through when we at least know the
        // registry, otherwise the client sent something we cannot route.
        return match registry {
            Some(registry) => {
                tracing::debug!(path, "unparseable request, passing through");
                forward(&state, registry, &path_qs, &method, &headers, body).await
            }
            None => error_response(
                StatusCode::BAD_REQUEST,
                json!({"error": "Could not determine registry type", "path": path}),
            ),
        };
    }

    let Some(registry) = registry else {
        return error_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "Could not determine registry type", "path": path}),
        );
    };

    tracing::info!(
        method = %method,
        path,
        registry = registry.as_str(),
        package = parsed.package_name,
        version = parsed.version.as_deref().unwrap_or("latest"),
        "proxying request"
    );

    if parsed.is_metadata_request || parsed.is_tarball_request {
        let decision =
            state
                .evaluator
                .evaluate(&parsed.package_name, parsed.version.as_deref(), registry);

        if decision.decision == Decision::Deny {
            tracing::warn!(
                registry = registry.as_str(),
                package = parsed.package_name,
                violations = decision.violated_rules.join(", "),
                "blocked by policy"
            );
            return deny_response(&parsed, registry, &decision);
        }
        if !decision.violated_rules.is_empty() {
            tracing::info!(
                package = parsed.package_name,
                mode = state.evaluator.decision_mode().as_str(),
                violations = decision.violated_rules.join(", "),
                "allowed with violations"
            );
        }
    }

    forward(&state, registry, &path_qs, &method, &headers, body).await
}

fn detect_registry_hint(headers: &[(String, String)], path: &str) -> Option<Ecosystem> {
    let header = |wanted: &str| {
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.to_lowercase())
            .unwrap_or_default()
    };

    let user_agent = header("user-agent");
    if user_agent.contains("npm") || user_agent.contains("node") {
        return Some(Ecosystem::Npm);
    }
    if user_agent.contains("pip") || user_agent.contains("python") {
        return Some(Ecosystem::Pypi);
    }
    if user_agent.contains("maven") || user_agent.contains("gradle") {
        return Some(Ecosystem::Maven);
    }
    if user_agent.contains("nuget") || user_agent.contains("dotnet") {
        return Some(Ecosystem::Nuget);
    }

    if header("accept").contains("application/vnd.npm") {
        return Some(Ecosystem::Npm);
    }

    if path.starts_with("/simple/") || path.starts_with("/pypi/") {
        return Some(Ecosystem::Pypi);
    }
    if path.starts_with("/v3/") || path.starts_with("/v3-flatcontainer/") {
        return Some(Ecosystem::Nuget);
    }
    if path.contains("/maven2/") || path.ends_with(".pom") || path.ends_with(".jar") {
        return Some(Ecosystem::Maven);
    }

    None
}

async fn forward(
    state: &ProxyState,
    registry: Ecosystem,
    path_qs: &str,
    method: &Method,
    headers: &[(String, String)],
    body: Body,
) -> Response {
    let Some(url) = state.upstream.build_url(registry, path_qs) else {
        return error_response(
            StatusCode::BAD_GATEWAY,
            json!({"error": "no upstream configured", "registry": registry.as_str()}),
        );
    };

    let upstream_headers = UpstreamClient::build_request_headers(headers);
    let cacheable_request = *method == Method::GET
        && UpstreamClient::is_cacheable_request(headers);
    let cache_key = UpstreamClient::cache_key(&url, &upstream_headers);

    if cacheable_request {
        if let Some((body, cached_headers)) = state.response_cache.get(&cache_key) {
            tracing::debug!(url, "response cache hit");
            return bytes_response(StatusCode::OK, &cached_headers, body);
        }
    }

    // Copy the request body for non-GET/HEAD methods only.
    let request_body = if *method != Method::GET && *method != Method::HEAD {
        match hyper::body::to_bytes(body).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes.to_vec()),
            Ok(_) => None,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    json!({"error": format!("unreadable request body: {e}")}),
                );
            }
        }
    } else {
        None
    };

    let response = match state
        .upstream
        .request(&url, method.as_str(), &upstream_headers, request_body)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url, error = %e, "upstream request failed");
            return error_response(
                StatusCode::BAD_GATEWAY,
                json!({"error": e.to_string(), "upstream": url}),
            );
        }
    };

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let filtered_headers = UpstreamClient::filter_response_headers(response.headers());

    let should_cache = cacheable_request
        && status == StatusCode::OK
        && UpstreamClient::is_cacheable_response(&filtered_headers);

    if should_cache {
        match response.bytes().await {
            Ok(bytes) => {
                state
                    .response_cache
                    .set(&cache_key, bytes.to_vec(), filtered_headers.clone());
                bytes_response(status, &filtered_headers, bytes.to_vec())
            }
            Err(e) => error_response(
                StatusCode::BAD_GATEWAY,
                json!({"error": format!("upstream body read failed: {e}")}),
            ),
        }
    } else {
        // Stream everything else (tarballs in particular) to the client.
        stream_response(status, &filtered_headers, response)
    }
}

fn deny_response(
    parsed: &ParsedRequest,
    registry: Ecosystem,
    decision: &PolicyDecision,
) -> Response {
    let version_suffix = parsed
        .version
        .as_deref()
        .map(|v| format!("@{v}"))
        .unwrap_or_default();
    let body = json!({
        "error": "Package blocked by policy",
        "package": parsed.package_name,
        "version": parsed.version,
        "registry": registry.as_str(),
        "violated_rules": decision.violated_rules,
        "message": format!(
            "Package {}{version_suffix} is blocked by depgate policy. Violations: {}",
            parsed.package_name,
            decision.violated_rules.join(", ")
        ),
    });
    error_response(StatusCode::FORBIDDEN, body)
}

fn error_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn bytes_response(status: StatusCode, headers: &[(String, String)], body: Vec<u8>) -> Response {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(boxed(Full::from(body)))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

fn stream_response(
    status: StatusCode,
    headers: &[(String, String)],
    response: reqwest::Response,
) -> Response {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(boxed(StreamBody::new(response.bytes_stream())))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn hint_detection_order() {
        assert_eq!(
            detect_registry_hint(&headers(&[("User-Agent", "npm/10.2.0 node/v20")]), "/x"),
            Some(Ecosystem::Npm)
        );
        assert_eq!(
            detect_registry_hint(&headers(&[("User-Agent", "pip/23.3")]), "/x"),
            Some(Ecosystem::Pypi)
        );
        assert_eq!(
            detect_registry_hint(&headers(&[("User-Agent", "Apache-Maven/3.9")]), "/x"),
            Some(Ecosystem::Maven)
        );
        assert_eq!(
            detect_registry_hint(&headers(&[("User-Agent", "NuGet Command Line/6.0")]), "/x"),
            Some(Ecosystem::Nuget)
        );
        assert_eq!(
            detect_registry_hint(
                &headers(&[("Accept", "application/vnd.npm.install-v1+json")]),
                "/x"
            ),
            Some(Ecosystem::Npm)
        );
        assert_eq!(
            detect_registry_hint(&headers(&[]), "/simple/requests/"),
            Some(Ecosystem::Pypi)
        );
        assert_eq!(
            detect_registry_hint(&headers(&[]), "/v3-flatcontainer/x/index.json"),
            Some(Ecosystem::Nuget)
        );
        assert_eq!(
            detect_registry_hint(&headers(&[]), "/maven2/com/x/y/z.pom"),
            Some(Ecosystem::Maven)
        );
        assert_eq!(detect_registry_hint(&headers(&[]), "/lodash"), None);
    }

    #[test]
    fn non_loopback_bind_requires_opt_in() {
        let mut settings = ProxySettings {
            host: "0.0.0.0".to_string(),
            ..Default::default()
        };
        assert!(ensure_bindable(&settings).is_err());
        settings.allow_external = true;
        assert!(ensure_bindable(&settings).is_ok());

        let local = ProxySettings::default();
        assert!(ensure_bindable(&local).is_ok());
    }

    #[test]
    fn deny_body_shape() {
        let parsed = ParsedRequest {
            registry: Some(Ecosystem::Npm),
            package_name: "bad-pkg".to_string(),
            version: None,
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: "/bad-pkg".to_string(),
        };
        let decision = PolicyDecision {
            decision: Decision::Deny,
            violated_rules: vec!["excluded by pattern: bad-.*".to_string()],
            evaluated_metrics: Default::default(),
        };
        let response = deny_response(&parsed, Ecosystem::Npm, &decision);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
