//! `depgate scan`: the offline analysis pipeline.

use std::path::PathBuf;

use miette::Result;

use depgate_core::ecosystem::Ecosystem;
use depgate_core::policy::Decision;
use depgate_registry::ScanOptions;
use depgate_util::errors::{DepGateError, ExitCode};
use depgate_util::progress::{status, status_warn};

use crate::cli::{AnalysisLevel, OutputFormat};
use crate::export;
use crate::orchestrator::{self, ScanInputs};

pub struct ScanArgs {
    pub package_type: Ecosystem,
    pub load_list: Option<PathBuf>,
    pub directory: Option<PathBuf>,
    pub packages: Vec<String>,
    pub recursive: bool,
    pub direct_only: bool,
    pub require_lockfile: bool,
    pub analysis: AnalysisLevel,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub config: Option<PathBuf>,
    pub policy_preset: Option<String>,
    pub set: Vec<String>,
}

pub async fn exec(args: ScanArgs) -> Result<i32> {
    if args.recursive && args.directory.is_none() {
        tracing::warn!("--recursive only applies to directory scans");
    }

    let config = match super::load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            status_warn("Error", &e.to_string());
            return Ok(ExitCode::FileError.code());
        }
    };

    let inputs = ScanInputs {
        ecosystem: args.package_type,
        list_file: args.load_list,
        directory: args.directory,
        packages: args.packages,
        scan: ScanOptions {
            recursive: args.recursive,
            direct_only: args.direct_only,
            require_lockfile: args.require_lockfile,
        },
    };

    let (packages, code) = match orchestrator::run_scan(
        &inputs,
        args.analysis,
        &config,
        args.policy_preset.as_deref(),
        &args.set,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            status_warn("Error", &e.to_string());
            let code = match e {
                DepGateError::Manifest { .. } | DepGateError::Io(_) | DepGateError::Config { .. } => {
                    ExitCode::FileError
                }
                DepGateError::Network { .. } => ExitCode::ConnectionError,
                _ => ExitCode::FileError,
            };
            return Ok(code.code());
        }
    };

    let present = packages.iter().filter(|p| p.exists == Some(true)).count();
    let denied = packages
        .iter()
        .filter(|p| p.policy_decision == Some(Decision::Deny))
        .count();
    status(
        "Analyzed",
        &format!(
            "{} package(s), {present} present{}",
            packages.len(),
            if args.analysis == AnalysisLevel::Policy {
                format!(", {denied} denied by policy")
            } else {
                String::new()
            }
        ),
    );

    match &args.output {
        Some(path) => {
            if let Err(e) = export::export(&packages, path, args.format) {
                status_warn("Error", &e.to_string());
                return Ok(ExitCode::FileError.code());
            }
            status("Exported", &path.display().to_string());
        }
        None => {
            let body = match args.format {
                OutputFormat::Json => {
                    serde_json::to_string_pretty(&export::render_json(&packages))
                        .unwrap_or_default()
                }
                OutputFormat::Csv => export::render_csv(&packages),
            };
            println!("{body}");
        }
    }

    Ok(code.code())
}
