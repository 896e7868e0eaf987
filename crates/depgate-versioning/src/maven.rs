//! Maven version resolution from `maven-metadata.xml`.

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;

use depgate_core::request::{ResolutionMode, VersionSpec};
use depgate_util::errors::DepGateError;

use crate::cache::CachedCandidates;
use crate::maven_version::{parse_range_union, MavenVersion};

/// Default Maven Central base.
pub const REGISTRY_BASE: &str = "https://repo1.maven.org/maven2";

/// Artifact-level Maven metadata listing available versions.
#[derive(Debug, Clone, Default)]
pub struct MavenMetadata {
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
}

/// Parse an artifact-level `maven-metadata.xml`.
///
/// Namespaces are stripped via local names before matching.
pub fn parse_metadata(xml: &str) -> Result<MavenMetadata, DepGateError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = MavenMetadata::default();
    let mut path: Vec<String> = Vec::new();
    let mut text_buf = String::new();

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
                match path.join(">").as_str() {
                    "metadata>versioning>latest" => meta.latest = Some(text_buf.clone()),
                    "metadata>versioning>release" => meta.release = Some(text_buf.clone()),
                    "metadata>versioning>versions>version" => {
                        if !text_buf.trim().is_empty() {
                            meta.versions.push(text_buf.trim().to_string());
                        }
                    }
                    _ => {}
                }
                path.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DepGateError::Manifest {
                    message: format!("failed to parse maven-metadata.xml: {e}"),
                });
            }
            _ => {}
        }
    }

    Ok(meta)
}

/// Metadata URL for a `groupId:artifactId` coordinate.
pub fn metadata_url(base_url: &str, group: &str, artifact: &str) -> String {
    format!(
        "{}/{}/{}/maven-metadata.xml",
        base_url.trim_end_matches('/'),
        group.replace('.', "/"),
        artifact
    )
}

/// Fetch candidate versions for a `groupId:artifactId` identifier.
///
/// Identifiers without a colon produce an empty candidate set; the
/// orchestrator rejects them before resolution normally.
pub async fn fetch_candidates(
    client: &Client,
    identifier: &str,
    base_url: &str,
) -> Result<CachedCandidates, DepGateError> {
    let Some((group, artifact)) = identifier.split_once(':') else {
        return Ok(CachedCandidates::default());
    };
    let url = metadata_url(base_url, group, artifact);
    let Some(xml) = crate::get_text(client, &url).await? else {
        return Ok(CachedCandidates::default());
    };
    match parse_metadata(&xml) {
        Ok(meta) => Ok(CachedCandidates {
            versions: meta.versions,
            latest: meta.latest,
            release: meta.release,
        }),
        Err(_) => Ok(CachedCandidates::default()),
    }
}

/// Apply Maven range semantics to select a version.
pub fn pick(
    spec: Option<&VersionSpec>,
    cached: &CachedCandidates,
) -> (Option<String>, usize, Option<String>) {
    let candidates = &cached.versions;
    let count = candidates.len();

    let Some(spec) = spec else {
        return pick_latest(cached);
    };

    match spec.mode {
        ResolutionMode::Exact => pick_exact(&spec.raw, candidates),
        ResolutionMode::Range | ResolutionMode::Latest => pick_range(&spec.raw, candidates),
    }
}

fn pick_latest(cached: &CachedCandidates) -> (Option<String>, usize, Option<String>) {
    let candidates = &cached.versions;
    let count = candidates.len();
    if count == 0 && cached.release.is_none() && cached.latest.is_none() {
        return (None, 0, Some("No versions available".to_string()));
    }

    // <release> wins, then <latest>, then the highest non-SNAPSHOT entry.
    if let Some(release) = cached.release.as_ref().filter(|v| !v.trim().is_empty()) {
        return (Some(release.clone()), count, None);
    }
    if let Some(latest) = cached.latest.as_ref().filter(|v| !v.trim().is_empty()) {
        return (Some(latest.clone()), count, None);
    }

    let stable = candidates
        .iter()
        .filter(|v| !v.ends_with("-SNAPSHOT"))
        .max_by_key(|v| MavenVersion::parse(v));
    if let Some(version) = stable {
        return (Some(version.clone()), count, None);
    }

    // Only SNAPSHOTs published: take the highest one.
    let snapshot = candidates.iter().max_by_key(|v| MavenVersion::parse(v));
    match snapshot {
        Some(version) => (Some(version.clone()), count, None),
        None => (None, count, Some("No versions available".to_string())),
    }
}

fn pick_exact(version: &str, candidates: &[String]) -> (Option<String>, usize, Option<String>) {
    if candidates.iter().any(|c| c == version) {
        (Some(version.to_string()), candidates.len(), None)
    } else {
        (
            None,
            candidates.len(),
            Some(format!("Version {version} not found")),
        )
    }
}

fn pick_range(raw: &str, candidates: &[String]) -> (Option<String>, usize, Option<String>) {
    let count = candidates.len();
    if candidates.is_empty() {
        return (None, 0, Some("No versions available".to_string()));
    }

    let Some(elements) = parse_range_union(raw) else {
        // Not bracket syntax: Maven treats a bare version as a pin.
        return pick_exact(raw, candidates);
    };

    let best = candidates
        .iter()
        .filter(|candidate| elements.iter().any(|elem| elem.contains(candidate)))
        .max_by_key(|candidate| MavenVersion::parse(candidate));

    match best {
        Some(version) => (Some(version.clone()), count, None),
        None => (
            None,
            count,
            Some(format!("No versions match range '{raw}'")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(list: &[&str]) -> CachedCandidates {
        CachedCandidates {
            versions: list.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn range_spec(raw: &str) -> VersionSpec {
        VersionSpec {
            raw: raw.to_string(),
            mode: ResolutionMode::Range,
            include_prerelease: false,
        }
    }

    const METADATA_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>com.google.guava</groupId>
  <artifactId>guava</artifactId>
  <versioning>
    <latest>33.0.0-jre</latest>
    <release>33.0.0-jre</release>
    <versions>
      <version>31.0-jre</version>
      <version>32.0.0-jre</version>
      <version>33.0.0-jre</version>
    </versions>
  </versioning>
</metadata>"#;

    #[test]
    fn parses_metadata_document() {
        let meta = parse_metadata(METADATA_XML).unwrap();
        assert_eq!(meta.release.as_deref(), Some("33.0.0-jre"));
        assert_eq!(meta.latest.as_deref(), Some("33.0.0-jre"));
        assert_eq!(meta.versions.len(), 3);
    }

    #[test]
    fn metadata_url_layout() {
        assert_eq!(
            metadata_url(REGISTRY_BASE, "com.google.guava", "guava"),
            "https://repo1.maven.org/maven2/com/google/guava/guava/maven-metadata.xml"
        );
    }

    #[test]
    fn latest_prefers_release_field() {
        let mut c = cached(&["1.0", "2.0", "3.0-SNAPSHOT"]);
        c.release = Some("2.0".to_string());
        c.latest = Some("3.0-SNAPSHOT".to_string());
        let (version, _, _) = pick(None, &c);
        assert_eq!(version.as_deref(), Some("2.0"));
    }

    #[test]
    fn latest_falls_back_to_highest_stable() {
        let (version, _, _) = pick(None, &cached(&["1.0", "2.0", "2.1-SNAPSHOT"]));
        assert_eq!(version.as_deref(), Some("2.0"));
    }

    #[test]
    fn latest_uses_snapshot_when_nothing_stable() {
        let (version, _, _) = pick(None, &cached(&["1.0-SNAPSHOT", "1.1-SNAPSHOT"]));
        assert_eq!(version.as_deref(), Some("1.1-SNAPSHOT"));
    }

    #[test]
    fn bracket_range_selects_highest_match() {
        let spec = range_spec("[1.0,2.0)");
        let (version, _, _) = pick(Some(&spec), &cached(&["0.9", "1.0", "1.9", "2.0"]));
        assert_eq!(version.as_deref(), Some("1.9"));
    }

    #[test]
    fn union_range_matches_either_interval() {
        let spec = range_spec("[1.0,2.0),[3.0,4.0]");
        let (version, _, _) = pick(Some(&spec), &cached(&["1.5", "2.5", "3.5"]));
        assert_eq!(version.as_deref(), Some("3.5"));
    }

    #[test]
    fn single_element_bracket_is_prefix_pin() {
        let spec = range_spec("[1.2]");
        let (version, _, _) = pick(Some(&spec), &cached(&["1.2.3", "1.3.0"]));
        assert_eq!(version.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn empty_candidates_report_no_versions() {
        let (version, count, error) = pick(None, &cached(&[]));
        assert!(version.is_none());
        assert_eq!(count, 0);
        assert_eq!(error.as_deref(), Some("No versions available"));
    }
}
