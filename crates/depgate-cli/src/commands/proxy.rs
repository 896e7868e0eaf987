//! `depgate proxy`: run the intercepting registry proxy.

use std::path::PathBuf;

use miette::Result;

use depgate_core::config::DecisionMode;
use depgate_core::policy::PolicyConfig;
use depgate_util::errors::{DepGateError, ExitCode};
use depgate_util::progress::status_warn;

pub struct ProxyArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub allow_external: bool,
    pub decision_mode: Option<DecisionMode>,
    pub upstream_npm: Option<String>,
    pub upstream_pypi: Option<String>,
    pub upstream_maven: Option<String>,
    pub upstream_nuget: Option<String>,
    pub cache_ttl: Option<u64>,
    pub response_cache_ttl: Option<u64>,
    pub timeout: Option<u64>,
    pub config: Option<PathBuf>,
}

pub async fn exec(args: ProxyArgs) -> Result<i32> {
    let config = match super::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            status_warn("Error", &e.to_string());
            return Ok(ExitCode::FileError.code());
        }
    };

    let mut settings = config.proxy.clone();
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if args.allow_external {
        settings.allow_external = true;
    }
    if let Some(mode) = args.decision_mode {
        settings.decision_mode = mode;
    }
    if let Some(url) = args.upstream_npm {
        settings.upstream_npm = url;
    }
    if let Some(url) = args.upstream_pypi {
        settings.upstream_pypi = url;
    }
    if let Some(url) = args.upstream_maven {
        settings.upstream_maven = url;
    }
    if let Some(url) = args.upstream_nuget {
        settings.upstream_nuget = url;
    }
    if let Some(ttl) = args.cache_ttl {
        settings.cache_ttl = ttl;
    }
    if let Some(ttl) = args.response_cache_ttl {
        settings.response_cache_ttl = ttl;
    }
    if let Some(timeout) = args.timeout {
        settings.timeout_secs = timeout;
    }

    let policy = match policy_from_config(&config) {
        Ok(policy) => policy,
        Err(e) => {
            status_warn("Error", &e.to_string());
            return Ok(ExitCode::FileError.code());
        }
    };

    depgate_proxy::server::run(settings, policy).await?;
    Ok(ExitCode::Success.code())
}

/// The proxy evaluates only an explicitly configured `[policy]` table; with
/// none present every package is allowed.
pub(crate) fn policy_from_config(
    config: &depgate_core::config::Config,
) -> Result<Option<PolicyConfig>, DepGateError> {
    config
        .policy
        .as_ref()
        .map(|value| {
            serde_json::from_value(value.clone()).map_err(|e| DepGateError::Config {
                message: format!("invalid policy configuration: {e}"),
            })
        })
        .transpose()
}
