//! Version resolution across package ecosystems.
//!
//! Each ecosystem module implements the same two-step contract: an async
//! `fetch_candidates` that pulls the version universe from the registry, and
//! a pure `pick` that applies the requested spec's semantics to it.
//! [`resolve_all`] fans requests out concurrently (bounded by a semaphore)
//! and shares fetched candidates through a TTL [`cache::ResolverCache`].

pub mod cache;
pub mod maven;
pub mod maven_version;
pub mod npm;
pub mod nuget;
pub mod pep440;
pub mod pypi;
pub mod semver_ext;

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use depgate_core::ecosystem::Ecosystem;
use depgate_core::request::{PackageRequest, ResolutionMode, ResolutionResult};
use depgate_util::errors::DepGateError;

use crate::cache::{CachedCandidates, ResolverCache};

/// Error text surfaced when the registry could not be reached at all.
pub const ERR_REQUEST_FAILED: &str = "request failed";

/// GET a JSON document; `Ok(None)` for any non-2xx status, `Err` only for
/// transport failures.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    accept: Option<&str>,
) -> Result<Option<T>, DepGateError> {
    let mut request = client.get(url);
    if let Some(accept) = accept {
        request = request.header(reqwest::header::ACCEPT, accept);
    }
    let response = request.send().await.map_err(|e| DepGateError::Network {
        message: format!("request to {url} failed: {e}"),
    })?;
    if !response.status().is_success() {
        return Ok(None);
    }
    match response.json::<T>().await {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Ok(None),
    }
}

/// GET a text document; `Ok(None)` for any non-2xx status.
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
) -> Result<Option<String>, DepGateError> {
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

async fn fetch_for(
    client: &Client,
    ecosystem: Ecosystem,
    identifier: &str,
) -> Result<CachedCandidates, DepGateError> {
    match ecosystem {
        Ecosystem::Npm => npm::fetch_candidates(client, identifier, npm::REGISTRY_BASE).await,
        Ecosystem::Pypi => pypi::fetch_candidates(client, identifier, pypi::REGISTRY_BASE).await,
        Ecosystem::Maven => maven::fetch_candidates(client, identifier, maven::REGISTRY_BASE).await,
        Ecosystem::Nuget => {
            nuget::fetch_candidates(client, identifier, nuget::V3_SERVICE_INDEX, nuget::V2_BASE)
                .await
        }
    }
}

fn pick_for(req: &PackageRequest, cached: &CachedCandidates) -> (Option<String>, usize, Option<String>) {
    let spec = req.requested_spec.as_ref();
    match req.ecosystem {
        Ecosystem::Npm => npm::pick(spec, cached),
        Ecosystem::Pypi => pypi::pick(spec, cached),
        Ecosystem::Maven => maven::pick(spec, cached),
        Ecosystem::Nuget => nuget::pick(spec, cached),
    }
}

/// Resolve a single request against its registry, consulting the cache.
pub async fn resolve_one(
    client: &Client,
    req: &PackageRequest,
    cache: &ResolverCache,
) -> ResolutionResult {
    let mode = req
        .requested_spec
        .as_ref()
        .map_or(ResolutionMode::Latest, |spec| spec.mode);
    let requested_spec = req.requested_spec.as_ref().map(|spec| spec.raw.clone());

    let cache_key = format!("{}:{}", req.ecosystem, req.identifier);
    let fetched = match cache.get(&cache_key) {
        Some(cached) => Ok(cached),
        None => match fetch_for(client, req.ecosystem, &req.identifier).await {
            Ok(cached) => {
                cache.set(&cache_key, cached.clone());
                Ok(cached)
            }
            Err(err) => Err(err),
        },
    };

    match fetched {
        Ok(cached) => {
            let (resolved_version, candidate_count, error) = pick_for(req, &cached);
            ResolutionResult {
                ecosystem: req.ecosystem,
                identifier: req.identifier.clone(),
                requested_spec,
                resolved_version,
                resolution_mode: mode,
                candidate_count,
                error,
            }
        }
        Err(err) => {
            tracing::debug!(identifier = %req.identifier, error = %err, "candidate fetch failed");
            ResolutionResult {
                ecosystem: req.ecosystem,
                identifier: req.identifier.clone(),
                requested_spec,
                resolved_version: None,
                resolution_mode: mode,
                candidate_count: 0,
                error: Some(ERR_REQUEST_FAILED.to_string()),
            }
        }
    }
}

/// Resolve all requests concurrently, bounded by `concurrency` permits.
///
/// Returns one result per unique `(ecosystem, identifier)`.
pub async fn resolve_all(
    client: &Client,
    requests: &[PackageRequest],
    cache: Arc<ResolverCache>,
    concurrency: usize,
) -> HashMap<(Ecosystem, String), ResolutionResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for req in requests.iter().cloned() {
        let client = client.clone();
        let cache = cache.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire().await;
            let result = resolve_one(&client, &req, &cache).await;
            ((req.ecosystem, req.identifier), result)
        });
    }

    let mut results = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        if let Ok((key, result)) = joined {
            results.insert(key, result);
        }
    }
    results
}
