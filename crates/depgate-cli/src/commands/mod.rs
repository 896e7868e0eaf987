//! Command dispatch and handler modules.

mod proxy;
mod run;
mod scan;

use std::path::Path;

use miette::Result;

use depgate_core::config::Config;
use depgate_util::errors::DepGateError;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
///
/// Returns the process exit code.
pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Scan {
            package_type,
            load_list,
            directory,
            packages,
            recursive,
            direct_only,
            require_lockfile,
            analysis,
            output,
            format,
            config,
            policy_preset,
            set,
        } => {
            scan::exec(scan::ScanArgs {
                package_type,
                load_list,
                directory,
                packages,
                recursive,
                direct_only,
                require_lockfile,
                analysis,
                output,
                format,
                config,
                policy_preset,
                set,
            })
            .await
        }
        Command::Proxy {
            host,
            port,
            allow_external,
            decision_mode,
            upstream_npm,
            upstream_pypi,
            upstream_maven,
            upstream_nuget,
            cache_ttl,
            response_cache_ttl,
            timeout,
            config,
        } => {
            proxy::exec(proxy::ProxyArgs {
                host,
                port,
                allow_external,
                decision_mode,
                upstream_npm,
                upstream_pypi,
                upstream_maven,
                upstream_nuget,
                cache_ttl,
                response_cache_ttl,
                timeout,
                config,
            })
            .await
        }
        Command::Run {
            config,
            decision_mode,
            command,
            args,
        } => run::exec(config.as_deref(), decision_mode, &command, &args).await,
    }
}

/// Load the config file when given; defaults otherwise.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config, DepGateError> {
    match path {
        Some(path) => Config::from_path(path),
        None => Ok(Config::default()),
    }
}
