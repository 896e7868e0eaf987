//! `depgate run`: wrap a package-manager command behind an ephemeral proxy.

use std::path::Path;

use miette::Result;

use depgate_core::config::DecisionMode;
use depgate_proxy::server::{self, ProxyState};
use depgate_util::errors::ExitCode;
use depgate_util::process::CommandBuilder;
use depgate_util::progress::{status, status_warn};

use crate::wrappers;

pub async fn exec(
    config_path: Option<&Path>,
    decision_mode: Option<DecisionMode>,
    command: &str,
    args: &[String],
) -> Result<i32> {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            status_warn("Error", &e.to_string());
            return Ok(ExitCode::FileError.code());
        }
    };

    let mut settings = config.proxy.clone();
    // Ephemeral, loopback-only: the kernel assigns the port.
    settings.host = "127.0.0.1".to_string();
    settings.port = 0;
    settings.allow_external = false;
    if let Some(mode) = decision_mode {
        settings.decision_mode = mode;
    }

    let policy = match super::proxy::policy_from_config(&config) {
        Ok(policy) => policy,
        Err(e) => {
            status_warn("Error", &e.to_string());
            return Ok(ExitCode::FileError.code());
        }
    };

    let state = match ProxyState::new(settings, policy) {
        Ok(state) => state,
        Err(e) => {
            status_warn("Error", &e.to_string());
            return Ok(ExitCode::FileError.code());
        }
    };
    let proxy = match server::bind(state).await {
        Ok(proxy) => proxy,
        Err(e) => {
            status_warn("Error", &e.to_string());
            return Ok(ExitCode::ConnectionError.code());
        }
    };
    let proxy_url = proxy.url();

    let wrapper = match wrappers::get_wrapper(command, args, &proxy_url) {
        Ok(Some(wrapper)) => wrapper,
        Ok(None) => {
            status_warn(
                "Error",
                &format!(
                    "unsupported package manager '{command}'; supported: {}",
                    wrappers::SUPPORTED_MANAGERS.join(", ")
                ),
            );
            proxy.shutdown().await;
            return Ok(ExitCode::FileError.code());
        }
        Err(e) => {
            status_warn("Error", &format!("cannot prepare wrapper config: {e}"));
            proxy.shutdown().await;
            return Ok(ExitCode::FileError.code());
        }
    };

    status(
        "Proxying",
        &format!("{command} through {proxy_url} ({})", wrapper.ecosystem),
    );

    let mut builder = CommandBuilder::new(command)
        .args(wrapper.extra_args.iter().cloned())
        .args(args.iter().cloned())
        .args(wrapper.append_args.iter().cloned());
    for (key, value) in &wrapper.env_vars {
        builder = builder.env(key, value);
    }

    // Inherit stdio; block on the child off the async runtime.
    let child_status = tokio::task::spawn_blocking(move || builder.status())
        .await
        .map_err(|e| depgate_util::errors::DepGateError::Generic {
            message: format!("child task failed: {e}"),
        })?;

    // Temp config files must outlive the child.
    drop(wrapper);
    proxy.shutdown().await;

    match child_status {
        Ok(status) => Ok(status.code().unwrap_or(ExitCode::Interrupted.code())),
        Err(e) => {
            status_warn("Error", &format!("failed to run {command}: {e}"));
            Ok(ExitCode::FileError.code())
        }
    }
}
