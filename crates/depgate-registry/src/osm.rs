//! OpenSourceMalware lookup (optional enrichment).
//!
//! Enabled only when a token resolves from `DEPGATE_OSM_API_TOKEN` or the
//! shell command in `DEPGATE_OSM_TOKEN_COMMAND`. Lookups are best-effort
//! and never fail the batch; a flagged package gets `osm_flagged` set and
//! a WARN log from the heuristics pass.

use reqwest::Client;
use serde_json::Value;

use depgate_core::package::Package;
use depgate_util::process::resolve_secret;

/// OpenSourceMalware API base.
pub const OSM_API_BASE: &str = "https://api.opensourcemalware.com/v1";

/// Env var holding the API token directly.
pub const OSM_TOKEN_ENV: &str = "DEPGATE_OSM_API_TOKEN";

/// Env var holding a shell command that prints the token.
pub const OSM_TOKEN_COMMAND_ENV: &str = "DEPGATE_OSM_TOKEN_COMMAND";

/// Resolve the OSM token from the environment, if configured.
pub async fn resolve_token() -> Option<String> {
    resolve_secret(OSM_TOKEN_ENV, OSM_TOKEN_COMMAND_ENV).await
}

/// Check each package against the malware intel API.
pub async fn check_packages(client: &Client, token: &str, pkgs: &mut [Package]) {
    check_packages_at(client, token, pkgs, OSM_API_BASE).await
}

/// Like [`check_packages`] with an explicit API base (test servers).
pub async fn check_packages_at(client: &Client, token: &str, pkgs: &mut [Package], base: &str) {
    for pkg in pkgs.iter_mut() {
        pkg.osm_flagged = check_one(client, token, pkg, base).await;
    }
}

async fn check_one(client: &Client, token: &str, pkg: &Package, base: &str) -> Option<bool> {
    let url = format!(
        "{}/malware/{}/{}",
        base.trim_end_matches('/'),
        pkg.ecosystem,
        pkg.identifier()
    );
    let response = client.get(&url).bearer_auth(token).send().await.ok()?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Some(false);
    }
    if !response.status().is_success() {
        tracing::debug!(package = %pkg, status = %response.status(), "osm lookup failed");
        return None;
    }

    let payload: Value = response.json().await.ok()?;
    Some(flagged_in(&payload))
}

/// Tolerate both `{malicious: bool}` and `{flagged: bool}` payloads, plus
/// a non-empty `findings` list.
fn flagged_in(payload: &Value) -> bool {
    for key in ["malicious", "flagged"] {
        if let Some(flag) = payload.get(key).and_then(Value::as_bool) {
            return flag;
        }
    }
    payload
        .get("findings")
        .and_then(Value::as_array)
        .map(|findings| !findings.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_shapes() {
        assert!(flagged_in(&json!({"malicious": true})));
        assert!(!flagged_in(&json!({"malicious": false})));
        assert!(flagged_in(&json!({"flagged": true})));
        assert!(flagged_in(&json!({"findings": [{"id": 1}]})));
        assert!(!flagged_in(&json!({"findings": []})));
        assert!(!flagged_in(&json!({})));
    }
}
