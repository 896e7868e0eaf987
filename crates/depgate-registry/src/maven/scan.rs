//! Maven source scanner: `<dependency>` extraction from `pom.xml`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;

use depgate_util::errors::DepGateError;

use crate::ScanOptions;

const MANIFEST: &str = "pom.xml";

/// Discover `groupId:artifactId` identifiers under a directory.
///
/// Every `<dependency>` under every `<dependencies>` block counts,
/// including managed ones; entries missing either coordinate are skipped.
/// Invalid XML yields an empty list, not an error.
pub fn scan_source(dir: &Path, opts: &ScanOptions) -> Result<Vec<String>, DepGateError> {
    tracing::info!(dir = %dir.display(), "maven scanner engaged");

    let poms = find_poms(dir, opts.recursive)?;
    let mut found: BTreeSet<String> = BTreeSet::new();
    for pom_path in poms {
        let Ok(body) = std::fs::read_to_string(&pom_path) else {
            continue;
        };
        for (group, artifact, _) in parse_dependencies(&body) {
            found.insert(format!("{group}:{artifact}"));
        }
    }
    Ok(found.into_iter().collect())
}

/// `(groupId, artifactId, version?)` triples, with property-reference
/// versions (`${...}`) treated as unspecified.
pub fn parse_dependencies(xml: &str) -> Vec<(String, String, Option<String>)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut dependencies = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text_buf = String::new();
    let mut current: Option<(Option<String>, Option<String>, Option<String>)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if tag == "dependency" && path.last().map(String::as_str) == Some("dependencies") {
                    current = Some((None, None, None));
                }
                path.push(tag);
                text_buf.clear();
            }
            Ok(Event::Text(ref e)) => {
                text_buf = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(_)) => {
                let tag = path.last().cloned().unwrap_or_default();
                let in_dependency = path.len() >= 2
                    && path.get(path.len() - 2).map(String::as_str) == Some("dependency");

                if let Some(dep) = current.as_mut() {
                    if in_dependency {
                        let text = text_buf.trim();
                        match tag.as_str() {
                            "groupId" => dep.0 = Some(text.to_string()),
                            "artifactId" => dep.1 = Some(text.to_string()),
                            "version" if !text.contains("${") && !text.is_empty() => {
                                dep.2 = Some(text.to_string());
                            }
                            _ => {}
                        }
                    }
                }

                if tag == "dependency" {
                    if let Some((Some(group), Some(artifact), version)) = current.take() {
                        if !group.is_empty() && !artifact.is_empty() {
                            dependencies.push((group, artifact, version));
                        }
                    }
                }

                path.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            // Invalid XML is non-fatal: return what parsed so far.
            Err(_) => break,
            _ => {}
        }
    }

    dependencies
}

/// Direct dependencies with their raw version specs, for resolution.
pub fn manifest_entries(dir: &Path, recursive: bool) -> Vec<(String, Option<String>)> {
    let Ok(poms) = find_poms(dir, recursive) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for pom_path in poms {
        let Ok(body) = std::fs::read_to_string(&pom_path) else {
            continue;
        };
        for (group, artifact, version) in parse_dependencies(&body) {
            entries.push((format!("{group}:{artifact}"), version));
        }
    }
    entries
}

fn find_poms(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, DepGateError> {
    if !recursive {
        let path = dir.join(MANIFEST);
        if !path.is_file() {
            return Err(DepGateError::Manifest {
                message: format!("{MANIFEST} not found in {}", dir.display()),
            });
        }
        return Ok(vec![path]);
    }
    let mut poms = Vec::new();
    crate::npm::scan::walk(dir, &mut |path| {
        if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST) {
            poms.push(path.to_path_buf());
        }
    });
    if poms.is_empty() {
        return Err(DepGateError::Manifest {
            message: format!("no {MANIFEST} found under {}", dir.display()),
        });
    }
    Ok(poms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POM: &str = r#"<?xml version="1.0"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
    <groupId>org.example</groupId>
    <artifactId>app</artifactId>
    <version>1.0.0</version>
    <dependencies>
        <dependency>
            <groupId>com.google.guava</groupId>
            <artifactId>guava</artifactId>
            <version>33.0.0-jre</version>
        </dependency>
        <dependency>
            <groupId>org.slf4j</groupId>
            <artifactId>slf4j-api</artifactId>
            <version>${slf4j.version}</version>
        </dependency>
        <dependency>
            <artifactId>orphan</artifactId>
        </dependency>
    </dependencies>
    <dependencyManagement>
        <dependencies>
            <dependency>
                <groupId>org.junit</groupId>
                <artifactId>junit-bom</artifactId>
                <version>5.10.0</version>
            </dependency>
        </dependencies>
    </dependencyManagement>
</project>"#;

    #[test]
    fn extracts_all_dependency_blocks() {
        let deps = parse_dependencies(POM);
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].0, "com.google.guava");
        assert_eq!(deps[0].2.as_deref(), Some("33.0.0-jre"));
        // Property references count as unspecified versions.
        assert_eq!(deps[1].1, "slf4j-api");
        assert_eq!(deps[1].2, None);
        assert_eq!(deps[2].0, "org.junit");
    }

    #[test]
    fn scan_returns_coordinates() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("pom.xml"), POM).unwrap();
        let found = scan_source(tmp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(
            found,
            vec![
                "com.google.guava:guava",
                "org.junit:junit-bom",
                "org.slf4j:slf4j-api"
            ]
        );
    }

    #[test]
    fn invalid_xml_is_non_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("pom.xml"), "<project><depend").unwrap();
        let found = scan_source(tmp.path(), &ScanOptions::default()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn missing_pom_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(scan_source(tmp.path(), &ScanOptions::default()).is_err());
    }
}
