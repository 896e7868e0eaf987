//! The offline pipeline: request building, resolution, registry
//! enrichment, heuristics, and policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;

use depgate_analysis::{heuristics, runner};
use depgate_core::config::Config;
use depgate_core::ecosystem::Ecosystem;
use depgate_core::package::Package;
use depgate_core::policy::Decision;
use depgate_core::request::{
    parse_manifest_entry, parse_token, PackageRequest, RequestSource, ResolutionResult,
};
use depgate_registry::{maven, npm, nuget, osm, pypi, ScanOptions};
use depgate_util::errors::{DepGateError, ExitCode};
use depgate_versioning::cache::ResolverCache;

use crate::cli::AnalysisLevel;

/// Inputs gathered from the CLI for one scan.
pub struct ScanInputs {
    pub ecosystem: Ecosystem,
    pub list_file: Option<PathBuf>,
    pub directory: Option<PathBuf>,
    pub packages: Vec<String>,
    pub scan: ScanOptions,
}

/// Read package tokens from a list file: one per line, `#` comments and
/// blank lines skipped.
pub fn load_pkgs_file(path: &Path) -> Result<Vec<String>, DepGateError> {
    let body = std::fs::read_to_string(path).map_err(|e| DepGateError::Manifest {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect())
}

/// Build the deduplicated request list from CLI inputs.
///
/// Maven identifiers must carry a `groupId:artifactId` coordinate; bare
/// names are rejected here with a file error.
pub fn build_requests(inputs: &ScanInputs) -> Result<Vec<PackageRequest>, DepGateError> {
    let eco = inputs.ecosystem;
    let mut requests: Vec<PackageRequest> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    let mut push = |req: PackageRequest| {
        if seen.insert(req.identifier.clone()) {
            requests.push(req);
        }
    };

    if let Some(list_file) = &inputs.list_file {
        for token in load_pkgs_file(list_file)? {
            push(parse_token(&token, eco, RequestSource::List));
        }
    }

    for token in &inputs.packages {
        push(parse_token(token, eco, RequestSource::Cli));
    }

    if let Some(dir) = &inputs.directory {
        // Manifest entries carry raw specs; the scan closure backfills
        // anything only the lockfile knows about, as latest.
        let entries: Vec<(String, Option<String>)> = match eco {
            Ecosystem::Npm => npm::scan::manifest_entries(dir, inputs.scan.recursive),
            Ecosystem::Pypi => pypi::scan::manifest_entries(dir),
            Ecosystem::Maven => maven::scan::manifest_entries(dir, inputs.scan.recursive),
            Ecosystem::Nuget => nuget::scan::manifest_entries(dir, inputs.scan.recursive),
        };
        for (identifier, spec) in entries {
            push(parse_manifest_entry(
                &identifier,
                spec.as_deref(),
                eco,
                RequestSource::Manifest,
            ));
        }

        let scanned = match eco {
            Ecosystem::Npm => npm::scan::scan_source(dir, &inputs.scan)?,
            Ecosystem::Pypi => pypi::scan::scan_source(dir, &inputs.scan)?,
            Ecosystem::Maven => maven::scan::scan_source(dir, &inputs.scan)?,
            Ecosystem::Nuget => nuget::scan::scan_source(dir, &inputs.scan)?,
        };
        for identifier in scanned {
            push(parse_manifest_entry(
                &identifier,
                None,
                eco,
                RequestSource::Lockfile,
            ));
        }
    }

    if eco == Ecosystem::Maven {
        for req in &requests {
            if !req.identifier.contains(':') {
                return Err(DepGateError::Manifest {
                    message: format!(
                        "invalid Maven coordinate '{}'; expected 'groupId:artifactId'",
                        req.identifier
                    ),
                });
            }
        }
    }

    Ok(requests)
}

/// One `Package` per unique identifier, annotated with its resolution.
pub fn create_packages(
    requests: &[PackageRequest],
    results: &std::collections::HashMap<(Ecosystem, String), ResolutionResult>,
) -> Vec<Package> {
    let mut packages = Vec::new();
    for req in requests {
        let mut pkg = match req.ecosystem {
            Ecosystem::Maven => match req.identifier.split_once(':') {
                Some((group, artifact)) => Package::with_org(artifact, group, req.ecosystem),
                None => Package::new(&req.identifier, req.ecosystem),
            },
            _ => Package::new(&req.identifier, req.ecosystem),
        };

        if let Some(result) = results.get(&(req.ecosystem, req.identifier.clone())) {
            pkg.requested_spec = result.requested_spec.clone();
            pkg.resolved_version = result.resolved_version.clone();
            pkg.resolution_mode = Some(result.resolution_mode);
            pkg.candidate_count = Some(result.candidate_count);
            if let Some(error) = &result.error {
                tracing::debug!(
                    identifier = req.identifier,
                    error,
                    "version resolution incomplete"
                );
            }
        }
        packages.push(pkg);
    }
    packages
}

/// Drive the full offline pipeline and return the annotated packages plus
/// the process exit code.
pub async fn run_scan(
    inputs: &ScanInputs,
    level: AnalysisLevel,
    config: &Config,
    preset: Option<&str>,
    set_overrides: &[String],
) -> Result<(Vec<Package>, ExitCode), DepGateError> {
    let client = depgate_registry::http::build_client(config.http.timeout_secs)?;

    let requests = build_requests(inputs)?;
    if requests.is_empty() {
        tracing::warn!("no packages to analyze");
        return Ok((Vec::new(), ExitCode::Success));
    }

    let spinner = depgate_util::progress::spinner(&format!(
        "Resolving {} package(s)...",
        requests.len()
    ));
    let cache = Arc::new(ResolverCache::default());
    let results =
        depgate_versioning::resolve_all(&client, &requests, cache, config.http.concurrency).await;
    spinner.finish_and_clear();

    let mut packages = create_packages(&requests, &results);

    fetch_registry_facts(&client, inputs.ecosystem, &mut packages, level).await?;

    if let Some(token) = osm::resolve_token().await {
        osm::check_packages(&client, &token, &mut packages).await;
    }

    if level >= AnalysisLevel::Heuristics {
        heuristics::run_heuristics(&mut packages, &config.heuristics);
    }

    if level == AnalysisLevel::Policy {
        let policy = runner::assemble_policy_config(
            config.policy.as_ref(),
            preset,
            Some(config.heuristics.min_release_age_days),
            set_overrides,
        )?;
        runner::run_policy_analysis(&mut packages, &policy);
    }

    let missing = packages.iter().any(|p| p.exists == Some(false));
    let denied = packages
        .iter()
        .any(|p| p.policy_decision == Some(Decision::Deny));
    let code = if missing || denied {
        ExitCode::PackageNotFound
    } else {
        ExitCode::Success
    };

    Ok((packages, code))
}

async fn fetch_registry_facts(
    client: &Client,
    ecosystem: Ecosystem,
    packages: &mut [Package],
    level: AnalysisLevel,
) -> Result<(), DepGateError> {
    let spinner = depgate_util::progress::spinner("Fetching registry metadata...");
    let result = match ecosystem {
        Ecosystem::Npm => {
            npm::client::recv_pkg_info(
                client,
                packages,
                level >= AnalysisLevel::Heuristics,
                npm::REGISTRY_BASE,
                npm::STATS_URL,
            )
            .await
        }
        Ecosystem::Pypi => pypi::client::recv_pkg_info(client, packages, pypi::REGISTRY_BASE).await,
        Ecosystem::Maven => {
            let cache = maven::discovery::MetadataCache::new();
            maven::client::recv_pkg_info(
                client,
                packages,
                &cache,
                maven::SEARCH_URL,
                maven::REPO_BASE,
            )
            .await
        }
        Ecosystem::Nuget => {
            nuget::client::recv_pkg_info(client, packages, nuget::V3_SERVICE_INDEX, nuget::V2_BASE)
                .await
        }
    };
    spinner.finish_and_clear();
    result
}
