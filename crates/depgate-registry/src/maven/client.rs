//! Maven registry client: existence and timestamps via the Central search
//! API, then POM-driven enrichment.

use reqwest::Client;
use serde_json::Value;

use depgate_core::package::Package;
use depgate_util::errors::DepGateError;

use crate::http;

use super::discovery::MetadataCache;
use super::enrich;

/// Populate registry facts for every package via the search API, then run
/// POM enrichment against the repository layout.
pub async fn recv_pkg_info(
    client: &Client,
    pkgs: &mut [Package],
    cache: &MetadataCache,
    search_url: &str,
    repo_base: &str,
) -> Result<(), DepGateError> {
    tracing::info!("maven registry engaged");
    for pkg in pkgs.iter_mut() {
        let Some(group) = pkg.org_id.clone() else {
            pkg.exists = Some(false);
            continue;
        };
        search_one(client, pkg, &group, search_url).await?;
        if pkg.exists == Some(true) {
            enrich::enrich_with_repo(client, cache, pkg, repo_base).await;
        }
    }
    Ok(())
}

async fn search_one(
    client: &Client,
    pkg: &mut Package,
    group: &str,
    search_url: &str,
) -> Result<(), DepGateError> {
    let url = format!(
        "{search_url}?q=g:%22{group}%22%20AND%20a:%22{}%22&rows=1&wt=json",
        pkg.name
    );
    let Some(payload) = http::get_json(client, &url, &[]).await? else {
        pkg.exists = Some(false);
        return Ok(());
    };

    let response = payload.get("response");
    let num_found = response
        .and_then(|r| r.get("numFound"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if num_found == 0 {
        pkg.exists = Some(false);
        return Ok(());
    }

    pkg.exists = Some(true);
    if let Some(doc) = response
        .and_then(|r| r.get("docs"))
        .and_then(Value::as_array)
        .and_then(|docs| docs.first())
    {
        if let Some(ts) = doc.get("timestamp").and_then(Value::as_i64) {
            pkg.release_timestamp_ms = Some(ts);
        }
        if let Some(count) = doc.get("versionCount").and_then(Value::as_u64) {
            pkg.version_count = Some(count as usize);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_quotes_coordinates() {
        // The query string embeds g:"group" AND a:"artifact" percent-encoded.
        let group = "com.google.guava";
        let artifact = "guava";
        let url = format!(
            "{}?q=g:%22{group}%22%20AND%20a:%22{artifact}%22&rows=1&wt=json",
            super::super::SEARCH_URL
        );
        assert!(url.contains("g:%22com.google.guava%22"));
        assert!(url.contains("a:%22guava%22"));
    }
}
