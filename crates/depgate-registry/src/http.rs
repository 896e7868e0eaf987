//! Shared HTTP helpers for registry clients.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use depgate_util::errors::DepGateError;

const USER_AGENT: &str = "depgate/0.2";

/// Build the shared reqwest client used by every registry adapter and the
/// provider clients. One pool per process.
pub fn build_client(timeout_secs: u64) -> Result<Client, DepGateError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| DepGateError::Network {
            message: format!("failed to create HTTP client: {e}"),
        })
}

/// GET a JSON document.
///
/// `Ok(None)` for 404 (the package does not exist); `Err` for transport
/// failures and server errors, which the offline batch treats as a
/// connection failure.
pub async fn get_json(
    client: &Client,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<Option<Value>, DepGateError> {
    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request.send().await.map_err(|e| DepGateError::Network {
        message: format!("request to {url} failed: {e}"),
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(DepGateError::Network {
            message: format!("HTTP {status} fetching {url}"),
        });
    }

    match response.json::<Value>().await {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(url, error = %e, "could not decode JSON, treating as missing");
            Ok(None)
        }
    }
}

/// Like [`get_json`] but treats any non-2xx status as absence. For
/// best-effort side lookups (stats services, simple API).
pub async fn get_json_lenient(
    client: &Client,
    url: &str,
    headers: &[(&str, &str)],
) -> Option<Value> {
    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request.send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.json::<Value>().await.ok()
}

/// GET a text document; `Ok(None)` for any non-2xx status.
pub async fn get_text(client: &Client, url: &str) -> Result<Option<String>, DepGateError> {
    let response = client.get(url).send().await.map_err(|e| DepGateError::Network {
        message: format!("request to {url} failed: {e}"),
    })?;
    if !response.status().is_success() {
        return Ok(None);
    }
    response
        .text()
        .await
        .map(Some)
        .map_err(|e| DepGateError::Network {
            message: format!("failed to read response from {url}: {e}"),
        })
}

/// HEAD a URL; true only for a 200.
pub async fn head_ok(client: &Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(_) => false,
    }
}

/// POST a JSON body, returning the decoded JSON response.
pub async fn post_json(
    client: &Client,
    url: &str,
    body: &Value,
) -> Result<Option<Value>, DepGateError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| DepGateError::Network {
            message: format!("request to {url} failed: {e}"),
        })?;
    if !response.status().is_success() {
        return Err(DepGateError::Network {
            message: format!("HTTP {} posting to {url}", response.status()),
        });
    }
    Ok(response.json::<Value>().await.ok())
}
