//! Maven discovery: metadata caching, POM facts, parent traversal, and
//! trust-signal probes against the repository layout.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;

use depgate_versioning::maven::{metadata_url, parse_metadata, MavenMetadata};
use depgate_versioning::maven_version::MavenVersion;

use crate::http;

/// Parent POM traversal depth limit.
pub const MAX_PARENT_DEPTH: usize = 8;

/// Per-session cache for parsed `maven-metadata.xml`, keyed
/// `group:artifact`. Mutex-guarded: the proxy may drive Maven enrichment
/// from another task while a scan is running.
#[derive(Default)]
pub struct MetadataCache {
    entries: Mutex<HashMap<String, MavenMetadata>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch(
        &self,
        client: &Client,
        base_url: &str,
        group: &str,
        artifact: &str,
    ) -> Option<MavenMetadata> {
        let key = format!("{group}:{artifact}");
        {
            let entries = self.entries.lock().expect("metadata cache poisoned");
            if let Some(meta) = entries.get(&key) {
                return Some(meta.clone());
            }
        }

        let url = metadata_url(base_url, group, artifact);
        let xml = http::get_text(client, &url).await.ok().flatten()?;
        let meta = parse_metadata(&xml).ok()?;

        let mut entries = self.entries.lock().expect("metadata cache poisoned");
        entries.insert(key, meta.clone());
        Some(meta)
    }
}

/// Latest release from metadata: `<release>`, else `<latest>`, else the
/// highest non-SNAPSHOT version.
pub fn resolve_latest_version(meta: &MavenMetadata) -> Option<String> {
    if let Some(release) = meta.release.as_ref().filter(|v| !v.trim().is_empty()) {
        return Some(release.clone());
    }
    if let Some(latest) = meta.latest.as_ref().filter(|v| !v.trim().is_empty()) {
        return Some(latest.clone());
    }
    meta.versions
        .iter()
        .filter(|v| !v.ends_with("-SNAPSHOT"))
        .max_by_key(|v| MavenVersion::parse(v))
        .cloned()
}

/// Previous published version relative to `selected`, in metadata order.
pub fn previous_version(meta: &MavenMetadata, selected: &str) -> Option<String> {
    let versions = &meta.versions;
    if versions.is_empty() {
        return None;
    }
    if let Some(idx) = versions.iter().position(|v| v == selected) {
        return if idx > 0 {
            Some(versions[idx - 1].clone())
        } else {
            None
        };
    }
    if versions.len() >= 2 {
        return Some(versions[versions.len() - 2].clone());
    }
    None
}

fn artifact_base_url(base_url: &str, group: &str, artifact: &str, version: &str) -> String {
    format!(
        "{}/{}/{artifact}/{version}/{artifact}-{version}",
        base_url.trim_end_matches('/'),
        group.replace('.', "/"),
    )
}

/// POM URL for a coordinate.
pub fn pom_url(base_url: &str, group: &str, artifact: &str, version: &str) -> String {
    format!("{}.pom", artifact_base_url(base_url, group, artifact, version))
}

/// Fetch POM content; `None` on 404 or transport failure.
pub async fn fetch_pom(
    client: &Client,
    base_url: &str,
    group: &str,
    artifact: &str,
    version: &str,
) -> Option<String> {
    let url = pom_url(base_url, group, artifact, version);
    http::get_text(client, &url).await.ok().flatten()
}

/// Reference to a parent POM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

/// The facts enrichment needs out of one POM document.
#[derive(Debug, Clone, Default)]
pub struct PomFacts {
    pub scm_url: Option<String>,
    pub scm_connection: Option<String>,
    pub scm_developer_connection: Option<String>,
    pub parent: Option<ParentRef>,
    pub license_name: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
}

impl PomFacts {
    /// Whether any SCM coordinate is present.
    pub fn has_scm(&self) -> bool {
        self.scm_url.is_some()
            || self.scm_connection.is_some()
            || self.scm_developer_connection.is_some()
    }

    /// SCM candidates in priority order.
    pub fn scm_candidates(&self) -> Vec<&str> {
        [
            self.scm_url.as_deref(),
            self.scm_connection.as_deref(),
            self.scm_developer_connection.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Streaming parse of the POM fields enrichment cares about. Namespaces
/// are stripped via local names before path matching.
pub fn parse_pom_facts(xml: &str) -> PomFacts {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut facts = PomFacts::default();
    let mut parent_group = None;
    let mut parent_artifact = None;
    let mut parent_version = None;

    let mut path: Vec<String> = Vec::new();
    let mut text_buf = String::new();
    let mut license_seen = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).to_string());
                text_buf.clear();
            }
            Ok(Event::Text(ref e)) => {
                text_buf = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(_)) => {
                let text = text_buf.trim();
                match path.join(">").as_str() {
                    "project>url" => {
                        facts.project_url = non_empty(text);
                    }
                    "project>scm>url" => facts.scm_url = non_empty(text),
                    "project>scm>connection" => facts.scm_connection = non_empty(text),
                    "project>scm>developerConnection" => {
                        facts.scm_developer_connection = non_empty(text);
                    }
                    "project>parent>groupId" => parent_group = non_empty(text),
                    "project>parent>artifactId" => parent_artifact = non_empty(text),
                    "project>parent>version" => parent_version = non_empty(text),
                    // Only the first license entry counts.
                    "project>licenses>license>name" if !license_seen => {
                        facts.license_name = non_empty(text);
                    }
                    "project>licenses>license>url" if !license_seen => {
                        facts.license_url = non_empty(text);
                    }
                    "project>licenses>license" => license_seen = true,
                    _ => {}
                }
                path.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    if let (Some(group_id), Some(artifact_id), Some(version)) =
        (parent_group, parent_artifact, parent_version)
    {
        facts.parent = Some(ParentRef {
            group_id,
            artifact_id,
            version,
        });
    }

    facts
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Walk the parent POM chain until SCM information turns up.
///
/// Bounded by `MAX_PARENT_DEPTH` and a visited set on
/// `(group, artifact, version)`. Provenance records each POM consulted and
/// the SCM fields found, keyed by depth.
pub async fn traverse_for_scm(
    client: &Client,
    base_url: &str,
    group: &str,
    artifact: &str,
    version: &str,
    provenance: &mut BTreeMap<String, String>,
) -> Option<PomFacts> {
    let mut coordinate = (group.to_string(), artifact.to_string(), version.to_string());
    let mut visited: HashSet<(String, String, String)> = HashSet::new();

    for depth in 0..MAX_PARENT_DEPTH {
        if !visited.insert(coordinate.clone()) {
            return None;
        }
        let (group, artifact, version) = &coordinate;

        let pom_xml = fetch_pom(client, base_url, group, artifact, version).await?;
        let facts = parse_pom_facts(&pom_xml);

        let depth_key = if depth > 0 {
            format!("depth{depth}")
        } else {
            String::new()
        };
        provenance.insert(
            format!("maven_pom{depth_key}.url"),
            pom_url(base_url, group, artifact, version),
        );

        if facts.has_scm() {
            let prefix = if depth > 0 {
                format!("maven_parent_pom.depth{depth}")
            } else {
                "maven_pom".to_string()
            };
            if let Some(url) = &facts.scm_url {
                provenance.insert(format!("{prefix}.scm.url"), url.clone());
            }
            if let Some(connection) = &facts.scm_connection {
                provenance.insert(format!("{prefix}.scm.connection"), connection.clone());
            }
            if let Some(dev) = &facts.scm_developer_connection {
                provenance.insert(format!("{prefix}.scm.developerConnection"), dev.clone());
            }
            return Some(facts);
        }

        let parent = facts.parent?;
        coordinate = (parent.group_id, parent.artifact_id, parent.version);
    }

    None
}

/// Supply-chain trust signals probed from sibling artifact paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustSignals {
    pub signatures: Option<bool>,
    pub provenance: Option<bool>,
    pub checksums: Option<bool>,
}

/// HEAD-probe the artifact directory for signature, provenance, and
/// checksum sidecars.
pub async fn collect_trust_signals(
    client: &Client,
    base_url: &str,
    group: &str,
    artifact: &str,
    version: &str,
) -> TrustSignals {
    if version.is_empty() {
        return TrustSignals::default();
    }
    let base = artifact_base_url(base_url, group, artifact, version);

    TrustSignals {
        signatures: probe_any(client, &base, &[".pom.asc", ".jar.asc"]).await,
        provenance: probe_any(
            client,
            &base,
            &[
                ".pom.sigstore.json",
                ".jar.sigstore.json",
                ".pom.sigstore",
                ".jar.sigstore",
            ],
        )
        .await,
        checksums: probe_any(
            client,
            &base,
            &[
                ".pom.sha512",
                ".jar.sha512",
                ".pom.sha256",
                ".jar.sha256",
                ".pom.sha1",
                ".jar.sha1",
            ],
        )
        .await,
    }
}

async fn probe_any(client: &Client, base: &str, suffixes: &[&str]) -> Option<bool> {
    for suffix in suffixes {
        if http::head_ok(client, &format!("{base}{suffix}")).await {
            return Some(true);
        }
    }
    Some(false)
}
