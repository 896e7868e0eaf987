//! Maven enrichment: version selection, POM license and SCM discovery,
//! parent traversal, trust probes, and provider validation.

use std::collections::BTreeMap;

use reqwest::Client;

use depgate_core::package::{LicenseInfo, Package, RepoError};
use depgate_core::trust;
use depgate_repository::providers::provider_for;
use depgate_repository::url_normalize::normalize_repo_url;
use depgate_repository::validation::ProviderValidationService;
use depgate_repository::version_match::VersionMatcher;

use super::discovery::{
    self, collect_trust_signals, parse_pom_facts, resolve_latest_version, MetadataCache,
};

/// Enrich one Maven package. The group lives in `org_id`, the artifact in
/// `name`; both are required.
pub async fn enrich_with_repo(
    client: &Client,
    cache: &MetadataCache,
    pkg: &mut Package,
    repo_base: &str,
) {
    let Some(group) = pkg.org_id.clone() else {
        return;
    };
    let artifact = pkg.name.clone();

    let meta = cache.get_or_fetch(client, repo_base, &group, &artifact).await;

    // Version-matching is disabled (empty version) when an exact pin failed
    // to resolve, but metadata-driven facts still populate.
    let selected = pkg
        .resolved_version
        .clone()
        .or_else(|| meta.as_ref().and_then(resolve_latest_version))
        .unwrap_or_default();

    if let Some(meta) = &meta {
        if pkg.version_count.is_none() {
            pkg.version_count = Some(meta.versions.len());
        }
        if !selected.is_empty() {
            pkg.previous_release_version = discovery::previous_version(meta, &selected);
        }
    }

    apply_trust_signals(client, pkg, repo_base, &group, &artifact, &selected).await;

    let mut provenance: BTreeMap<String, String> = BTreeMap::new();
    let mut candidates: Vec<String> = Vec::new();

    if !selected.is_empty() {
        if let Some(pom_xml) =
            discovery::fetch_pom(client, repo_base, &group, &artifact, &selected).await
        {
            let facts = parse_pom_facts(&pom_xml);
            extract_license(pkg, &facts);

            if facts.has_scm() {
                provenance.insert(
                    "maven_pom.url".to_string(),
                    discovery::pom_url(repo_base, &group, &artifact, &selected),
                );
                record_scm_provenance(&mut provenance, "maven_pom", &facts);
                candidates.extend(facts.scm_candidates().iter().map(|s| s.to_string()));
            } else {
                // No SCM in the release POM: walk the parent chain.
                if let Some(parent_facts) = discovery::traverse_for_scm(
                    client,
                    repo_base,
                    &group,
                    &artifact,
                    &selected,
                    &mut provenance,
                )
                .await
                {
                    candidates
                        .extend(parent_facts.scm_candidates().iter().map(|s| s.to_string()));
                }
                // Last resort: the POM <url> field when it is a known forge.
                if candidates.is_empty() {
                    if let Some(project_url) = &facts.project_url {
                        if normalize_repo_url(project_url, None)
                            .is_some_and(|r| r.host != depgate_core::package::RepoHost::Other)
                        {
                            provenance
                                .insert("maven_pom.project_url".to_string(), project_url.clone());
                            candidates.push(project_url.clone());
                        }
                    }
                }
            }
        }
    }

    if !candidates.is_empty() {
        pkg.repo_present_in_registry = Some(true);
    }
    pkg.provenance.extend(provenance);

    let match_version = pkg.match_version(&selected);
    validate_candidates(client, pkg, &candidates, &match_version).await;
}

fn record_scm_provenance(
    provenance: &mut BTreeMap<String, String>,
    prefix: &str,
    facts: &discovery::PomFacts,
) {
    if let Some(url) = &facts.scm_url {
        provenance.insert(format!("{prefix}.scm.url"), url.clone());
    }
    if let Some(connection) = &facts.scm_connection {
        provenance.insert(format!("{prefix}.scm.connection"), connection.clone());
    }
    if let Some(dev) = &facts.scm_developer_connection {
        provenance.insert(format!("{prefix}.scm.developerConnection"), dev.clone());
    }
}

fn extract_license(pkg: &mut Package, facts: &discovery::PomFacts) {
    if let Some(name) = &facts.license_name {
        pkg.license = LicenseInfo {
            id: Some(name.clone()),
            available: Some(true),
            source: Some("maven_pom_license".to_string()),
            url: facts.license_url.clone(),
        };
    }
}

async fn apply_trust_signals(
    client: &Client,
    pkg: &mut Package,
    repo_base: &str,
    group: &str,
    artifact: &str,
    selected: &str,
) {
    if selected.is_empty() {
        return;
    }
    let current = collect_trust_signals(client, repo_base, group, artifact, selected).await;
    let previous = match pkg.previous_release_version.clone() {
        Some(prev) => collect_trust_signals(client, repo_base, group, artifact, &prev).await,
        None => Default::default(),
    };

    pkg.registry_signature_present = current.signatures;
    pkg.provenance_present = current.provenance;
    pkg.previous_registry_signature_present = previous.signatures;
    pkg.previous_provenance_present = previous.provenance;
    pkg.registry_signature_regressed = trust::regressed(current.signatures, previous.signatures);
    pkg.provenance_regressed = trust::regressed(current.provenance, previous.provenance);
    pkg.trust_score =
        trust::score_from_boolean_signals(&[current.signatures, current.provenance]);
    pkg.previous_trust_score =
        trust::score_from_boolean_signals(&[previous.signatures, previous.provenance]);
    let (delta, decreased) = trust::score_delta(pkg.trust_score, pkg.previous_trust_score, 0.0);
    pkg.trust_score_delta = delta;
    pkg.trust_score_decreased = decreased;
}

async fn validate_candidates(
    client: &Client,
    pkg: &mut Package,
    candidates: &[String],
    version: &str,
) {
    let mut repo_errors: Vec<RepoError> = Vec::new();

    for candidate in candidates {
        let Some(normalized) = normalize_repo_url(candidate, None) else {
            repo_errors.push(RepoError {
                url: candidate.clone(),
                error_type: "parse".to_string(),
                message: "unparseable repository URL".to_string(),
            });
            continue;
        };

        pkg.repo_url_normalized = Some(normalized.normalized_url.clone());
        pkg.repo_host = Some(normalized.host);

        let Some(provider) = provider_for(normalized.host, client) else {
            continue;
        };
        let validated = ProviderValidationService::validate_and_populate(
            pkg,
            &normalized,
            version,
            provider.as_ref(),
            &VersionMatcher::new(),
        )
        .await;

        if validated && pkg.repo_exists == Some(true) {
            pkg.repo_resolved = Some(true);
            break;
        }
        repo_errors.push(RepoError {
            url: candidate.clone(),
            error_type: "network".to_string(),
            message: "repository lookup failed".to_string(),
        });
    }

    if !repo_errors.is_empty() {
        pkg.repo_errors = repo_errors;
    }
}
