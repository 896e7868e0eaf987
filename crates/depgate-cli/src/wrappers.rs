//! Per-manager wrapper configurations for `depgate run`.
//!
//! Each supported package manager gets environment variables, extra CLI
//! arguments, and/or temporary config files that redirect registry traffic
//! through the ephemeral proxy.

use std::collections::HashMap;
use std::io::Write;

use tempfile::NamedTempFile;

use depgate_core::ecosystem::Ecosystem;

/// Managers `depgate run` knows how to wrap.
pub const SUPPORTED_MANAGERS: &[&str] = &[
    "npm", "pnpm", "yarn", "bun", "pip", "pip3", "pipx", "poetry", "uv", "mvn", "gradle",
    "gradlew", "dotnet", "nuget",
];

/// How to rewrite one child invocation.
pub struct WrapperConfig {
    pub ecosystem: Ecosystem,
    pub env_vars: HashMap<String, String>,
    /// Inserted right after the manager binary.
    pub extra_args: Vec<String>,
    /// Appended after the user's arguments instead.
    pub append_args: Vec<String>,
    /// Temp config files kept alive for the child's lifetime.
    pub temp_files: Vec<NamedTempFile>,
}

impl WrapperConfig {
    fn new(ecosystem: Ecosystem) -> Self {
        Self {
            ecosystem,
            env_vars: HashMap::new(),
            extra_args: Vec::new(),
            append_args: Vec::new(),
            temp_files: Vec::new(),
        }
    }

    fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.to_string(), value.into());
        self
    }
}

fn proxy_host(proxy_url: &str) -> String {
    proxy_url
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .split([':', '/'])
        .next()
        .unwrap_or("127.0.0.1")
        .to_string()
}

fn temp_file(prefix: &str, suffix: &str, content: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Build the wrapper for a package manager, or `None` when unsupported.
///
/// `child_args` lets dotnet pick the right config-injection flag for its
/// subcommand.
pub fn get_wrapper(
    manager: &str,
    child_args: &[String],
    proxy_url: &str,
) -> std::io::Result<Option<WrapperConfig>> {
    let name = manager.rsplit(['/', '\\']).next().unwrap_or(manager).to_lowercase();
    let proxy_url = proxy_url.trim_end_matches('/');

    let config = match name.as_str() {
        "npm" | "pnpm" | "bun" => WrapperConfig::new(Ecosystem::Npm)
            .env("npm_config_registry", proxy_url),
        "yarn" => WrapperConfig::new(Ecosystem::Npm)
            .env("npm_config_registry", proxy_url)
            .env("YARN_NPM_REGISTRY_SERVER", proxy_url),
        "pip" | "pip3" | "pipx" | "poetry" => WrapperConfig::new(Ecosystem::Pypi)
            .env("PIP_INDEX_URL", format!("{proxy_url}/simple"))
            .env("PIP_TRUSTED_HOST", proxy_host(proxy_url)),
        "uv" => WrapperConfig::new(Ecosystem::Pypi)
            .env("UV_INDEX_URL", format!("{proxy_url}/simple"))
            .env("UV_INSECURE_HOST", proxy_host(proxy_url)),
        "mvn" => {
            let settings = temp_file(
                "depgate-mvn-",
                ".xml",
                &format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
<settings xmlns="http://maven.apache.org/SETTINGS/1.0.0">
  <mirrors>
    <mirror>
      <id>depgate-proxy</id>
      <mirrorOf>*</mirrorOf>
      <url>{proxy_url}</url>
    </mirror>
  </mirrors>
</settings>
"#
                ),
            )?;
            let mut config = WrapperConfig::new(Ecosystem::Maven);
            config.extra_args = vec![
                "-s".to_string(),
                settings.path().display().to_string(),
            ];
            config.temp_files.push(settings);
            config
        }
        "gradle" | "gradlew" => {
            let init = temp_file(
                "depgate-gradle-",
                ".gradle",
                &format!(
                    r#"allprojects {{
    repositories {{
        maven {{
            url "{proxy_url}"
            allowInsecureProtocol true
        }}
    }}
}}
"#
                ),
            )?;
            let mut config = WrapperConfig::new(Ecosystem::Maven);
            config.extra_args = vec![
                "--init-script".to_string(),
                init.path().display().to_string(),
            ];
            config.temp_files.push(init);
            config
        }
        "dotnet" => {
            let nuget_config = nuget_config_file(proxy_url)?;
            let path = nuget_config.path().display().to_string();
            let mut config = WrapperConfig::new(Ecosystem::Nuget);
            match dotnet_config_args(child_args, &path) {
                Some(args) => {
                    config.append_args = args;
                    config.temp_files.push(nuget_config);
                }
                None => {
                    tracing::warn!(
                        "dotnet subcommand not recognized for config injection; \
                         running without proxy interception"
                    );
                }
            }
            config
        }
        "nuget" => {
            let nuget_config = nuget_config_file(proxy_url)?;
            let mut config = WrapperConfig::new(Ecosystem::Nuget);
            config.append_args = vec![
                "-ConfigFile".to_string(),
                nuget_config.path().display().to_string(),
            ];
            config.temp_files.push(nuget_config);
            config
        }
        _ => return Ok(None),
    };

    Ok(Some(config))
}

fn nuget_config_file(proxy_url: &str) -> std::io::Result<NamedTempFile> {
    temp_file(
        "depgate-nuget-",
        ".config",
        &format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <packageSources>
    <clear />
    <add key="depgate-proxy" value="{proxy_url}" />
  </packageSources>
</configuration>
"#
        ),
    )
}

fn dotnet_config_args(child_args: &[String], config_path: &str) -> Option<Vec<String>> {
    let sub = child_args.first()?.to_lowercase();
    let second = child_args.get(1).map(|s| s.to_lowercase());

    match sub.as_str() {
        "tool" | "workload" if second.as_deref() == Some("restore") => Some(vec![
            "--configfile".to_string(),
            config_path.to_string(),
        ]),
        "restore" | "build" | "run" | "pack" => Some(vec![
            "--configfile".to_string(),
            config_path.to_string(),
        ]),
        "publish" | "test" => Some(vec![format!(
            "--property:RestoreConfigFile={config_path}"
        )]),
        "msbuild" => Some(vec![format!("-p:RestoreConfigFile={config_path}")]),
        _ => None,
    }
}
