//! CLI argument definitions for DepGate.
//!
//! Uses `clap` derive macros to define the full command surface. Each
//! command corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use depgate_core::config::DecisionMode;
use depgate_core::ecosystem::Ecosystem;

#[derive(Parser, Debug)]
#[command(
    name = "depgate",
    version,
    about = "Dependency supply-chain risk analyzer and policy gate",
    long_about = "DepGate resolves package versions against upstream registries, enriches \
                  them with registry facts and source-repository signals, evaluates a \
                  policy, and can run as an intercepting registry proxy."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Analysis depth for scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisLevel {
    Compare,
    Heuristics,
    Policy,
}

impl FromStr for AnalysisLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compare" | "comp" => Ok(AnalysisLevel::Compare),
            "heuristics" | "heur" => Ok(AnalysisLevel::Heuristics),
            "policy" | "pol" => Ok(AnalysisLevel::Policy),
            other => Err(format!("invalid analysis level: {other}")),
        }
    }
}

/// Export format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("invalid output format: {other}")),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze packages offline and evaluate policy
    Scan {
        /// Package ecosystem: npm, pypi, maven, nuget
        #[arg(short = 't', long = "type")]
        package_type: Ecosystem,
        /// Read package tokens from a file, one per line
        #[arg(long = "load_list", value_name = "FILE")]
        load_list: Option<PathBuf>,
        /// Scan a project directory for manifests and lockfiles
        #[arg(short, long, value_name = "DIR")]
        directory: Option<PathBuf>,
        /// Analyze a single package token (repeatable)
        #[arg(short, long = "package", value_name = "TOKEN")]
        packages: Vec<String>,
        /// Recurse into subdirectories when scanning
        #[arg(short, long)]
        recursive: bool,
        /// Ignore lockfiles; direct dependencies only
        #[arg(long)]
        direct_only: bool,
        /// Fail when the scanned project has no lockfile
        #[arg(long)]
        require_lockfile: bool,
        /// Analysis level: compare, heuristics, policy
        #[arg(short, long, default_value = "compare")]
        analysis: AnalysisLevel,
        /// Write results to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format: json or csv
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
        /// Config file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Policy preset: default, supply-chain, supply-chain-strict
        #[arg(long)]
        policy_preset: Option<String>,
        /// Policy overrides as dotted key=value pairs (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Run the intercepting registry proxy
    Proxy {
        /// Listen address
        #[arg(long)]
        host: Option<String>,
        /// Listen port (0 picks a free port)
        #[arg(long)]
        port: Option<u16>,
        /// Allow binding a non-loopback address
        #[arg(long)]
        allow_external: bool,
        /// How to react to policy denials: block, warn, audit
        #[arg(long)]
        decision_mode: Option<DecisionMode>,
        /// Upstream npm registry
        #[arg(long)]
        upstream_npm: Option<String>,
        /// Upstream PyPI registry
        #[arg(long)]
        upstream_pypi: Option<String>,
        /// Upstream Maven repository
        #[arg(long)]
        upstream_maven: Option<String>,
        /// Upstream NuGet registry
        #[arg(long)]
        upstream_nuget: Option<String>,
        /// Decision cache TTL in seconds
        #[arg(long)]
        cache_ttl: Option<u64>,
        /// Response cache TTL in seconds
        #[arg(long)]
        response_cache_ttl: Option<u64>,
        /// Upstream timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Config file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Wrap a package-manager command behind an ephemeral proxy
    Run {
        /// Config file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// How to react to policy denials: block, warn, audit
        #[arg(long)]
        decision_mode: Option<DecisionMode>,
        /// The package manager to wrap (npm, pip, mvn, dotnet, ...)
        command: String,
        /// Arguments passed to the wrapped command
        #[arg(last = true)]
        args: Vec<String>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
