use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use depgate_util::errors::DepGateError;

/// Default upstream registry URLs, by ecosystem.
pub const DEFAULT_UPSTREAM_NPM: &str = "https://registry.npmjs.org";
pub const DEFAULT_UPSTREAM_PYPI: &str = "https://pypi.org";
pub const DEFAULT_UPSTREAM_MAVEN: &str = "https://repo1.maven.org/maven2";
pub const DEFAULT_UPSTREAM_NUGET: &str = "https://api.nuget.org";

/// How the proxy reacts to a deny decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    /// Deny passes through as a 403.
    #[default]
    Block,
    /// Deny becomes allow; violations logged at WARN.
    Warn,
    /// Deny becomes allow; violations logged at INFO.
    Audit,
}

impl DecisionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionMode::Block => "block",
            DecisionMode::Warn => "warn",
            DecisionMode::Audit => "audit",
        }
    }
}

impl fmt::Display for DecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(DecisionMode::Block),
            "warn" => Ok(DecisionMode::Warn),
            "audit" => Ok(DecisionMode::Audit),
            other => Err(format!("invalid decision mode: {other}")),
        }
    }
}

/// Runtime configuration loaded from `--config` (TOML or JSON) with
/// built-in defaults. Owns every tunable the pipeline consults so no
/// component reads global mutable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub heuristics: HeuristicsConfig,

    #[serde(default)]
    pub proxy: ProxySettings,

    /// Raw `[policy]` table; deserialized into a `PolicyConfig` by the
    /// policy runner so unknown-key errors surface as violations, not
    /// config-load failures.
    #[serde(default)]
    pub policy: Option<serde_json::Value>,
}

/// Shared HTTP client settings from `[http]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-ecosystem concurrency cap for resolution and registry fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

/// Heuristics thresholds from `[heuristics]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    /// Releases younger than this many days are flagged suspiciously new.
    #[serde(default = "default_min_release_age_days")]
    pub min_release_age_days: i64,
    /// Trust-score drops of at least this much flag a score decrease.
    #[serde(default = "default_score_decrease_threshold")]
    pub score_decrease_threshold: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            min_release_age_days: default_min_release_age_days(),
            score_decrease_threshold: default_score_decrease_threshold(),
        }
    }
}

/// Proxy server settings from `[proxy]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_proxy_host")]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Binding to a non-loopback address requires this explicit opt-in.
    #[serde(default)]
    pub allow_external: bool,
    #[serde(default)]
    pub decision_mode: DecisionMode,
    #[serde(default = "default_decision_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default = "default_response_cache_ttl")]
    pub response_cache_ttl: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_upstream_npm")]
    pub upstream_npm: String,
    #[serde(default = "default_upstream_pypi")]
    pub upstream_pypi: String,
    #[serde(default = "default_upstream_maven")]
    pub upstream_maven: String,
    #[serde(default = "default_upstream_nuget")]
    pub upstream_nuget: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host: default_proxy_host(),
            port: default_proxy_port(),
            allow_external: false,
            decision_mode: DecisionMode::default(),
            cache_ttl: default_decision_cache_ttl(),
            response_cache_ttl: default_response_cache_ttl(),
            timeout_secs: default_timeout_secs(),
            upstream_npm: default_upstream_npm(),
            upstream_pypi: default_upstream_pypi(),
            upstream_maven: default_upstream_maven(),
            upstream_nuget: default_upstream_nuget(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    16
}

fn default_min_release_age_days() -> i64 {
    2
}

fn default_score_decrease_threshold() -> f64 {
    0.1
}

fn default_proxy_host() -> String {
    "127.0.0.1".to_string()
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_decision_cache_ttl() -> u64 {
    3600
}

fn default_response_cache_ttl() -> u64 {
    300
}

fn default_upstream_npm() -> String {
    DEFAULT_UPSTREAM_NPM.to_string()
}

fn default_upstream_pypi() -> String {
    DEFAULT_UPSTREAM_PYPI.to_string()
}

fn default_upstream_maven() -> String {
    DEFAULT_UPSTREAM_MAVEN.to_string()
}

fn default_upstream_nuget() -> String {
    DEFAULT_UPSTREAM_NUGET.to_string()
}

impl Config {
    /// Load configuration from a TOML or JSON file, selected by extension
    /// (anything that is not `.json` parses as TOML).
    pub fn from_path(path: &Path) -> Result<Self, DepGateError> {
        let body = std::fs::read_to_string(path).map_err(|e| DepGateError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&body).map_err(|e| DepGateError::Config {
                message: format!("invalid JSON config {}: {e}", path.display()),
            })
        } else {
            toml::from_str(&body).map_err(|e| DepGateError::Config {
                message: format!("invalid TOML config {}: {e}", path.display()),
            })
        }
    }
}
