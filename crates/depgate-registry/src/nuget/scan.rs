//! NuGet source scanner: project files and `packages.config`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use quick_xml::events::attributes::Attributes;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

use depgate_util::errors::DepGateError;

use crate::ScanOptions;

const LOCKFILE: &str = "packages.lock.json";

/// Discover package IDs from `.csproj`, `packages.config`,
/// `project.json`, and `Directory.Build.props` files.
///
/// NuGet scanning is direct-only; `packages.lock.json` presence only
/// gates `require_lockfile`.
pub fn scan_source(dir: &Path, opts: &ScanOptions) -> Result<Vec<String>, DepGateError> {
    tracing::info!(dir = %dir.display(), "nuget scanner engaged");

    let files = find_project_files(dir, opts.recursive);
    if files.is_empty() {
        return Err(DepGateError::Manifest {
            message: format!("no NuGet project files found in {}", dir.display()),
        });
    }

    if opts.require_lockfile {
        let has_lockfile = files
            .iter()
            .filter_map(|f| f.parent())
            .chain(std::iter::once(dir))
            .any(|parent| parent.join(LOCKFILE).is_file());
        if !has_lockfile {
            return Err(DepGateError::Manifest {
                message: format!("no {LOCKFILE} found under {}", dir.display()),
            });
        }
    }

    let mut found: BTreeSet<String> = BTreeSet::new();
    for file in files {
        let Ok(body) = std::fs::read_to_string(&file) else {
            continue;
        };
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name == "project.json" {
            found.extend(parse_project_json(&body));
        } else if name == "packages.config" {
            found.extend(parse_packages_config(&body));
        } else {
            found.extend(parse_package_references(&body));
        }
    }
    Ok(found.into_iter().collect())
}

fn find_project_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let is_project_file = |path: &Path| {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        name.ends_with(".csproj")
            || name == "packages.config"
            || name == "project.json"
            || name == "Directory.Build.props"
    };

    let mut files = Vec::new();
    if recursive {
        crate::npm::scan::walk(dir, &mut |path| {
            if is_project_file(path) {
                files.push(path.to_path_buf());
            }
        });
    } else if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_project_file(&path) {
                files.push(path);
            }
        }
    }
    files
}

/// `<PackageReference Include="X" .../>` IDs from a project or props file.
pub fn parse_package_references(xml: &str) -> Vec<String> {
    parse_attribute_ids(xml, "PackageReference", "Include")
}

/// `<package id="X" .../>` IDs from a `packages.config`.
pub fn parse_packages_config(xml: &str) -> Vec<String> {
    parse_attribute_ids(xml, "package", "id")
}

fn parse_attribute_ids(xml: &str, element: &str, attribute: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut ids = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if tag == element {
                    if let Some(id) = attribute_value(e.attributes(), attribute) {
                        ids.push(id);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    ids
}

fn attribute_value(attributes: Attributes<'_>, wanted: &str) -> Option<String> {
    for attr in attributes.flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        if key.eq_ignore_ascii_case(wanted) {
            let value = attr.unescape_value().ok()?.trim().to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Dependency names from a legacy `project.json`.
pub fn parse_project_json(body: &str) -> Vec<String> {
    let Ok(data) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    data.get("dependencies")
        .and_then(Value::as_object)
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default()
}

/// Direct dependencies with their version attributes, for resolution.
pub fn manifest_entries(dir: &Path, recursive: bool) -> Vec<(String, Option<String>)> {
    let mut entries = Vec::new();
    for file in find_project_files(dir, recursive) {
        let Ok(body) = std::fs::read_to_string(&file) else {
            continue;
        };
        let mut reader = Reader::from_str(&body);
        reader.config_mut().trim_text(true);
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    if tag == "PackageReference" || tag == "package" {
                        let id = attribute_value(e.attributes(), "Include")
                            .or_else(|| attribute_value(e.attributes(), "id"));
                        if let Some(id) = id {
                            let version = attribute_value(e.attributes(), "Version")
                                .or_else(|| attribute_value(e.attributes(), "version"));
                            entries.push((id, version));
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup>
    <PackageReference Include="Newtonsoft.Json" Version="13.0.3" />
    <PackageReference Include="Serilog" Version="3.1.1" />
  </ItemGroup>
</Project>"#;

    #[test]
    fn package_references_from_csproj() {
        assert_eq!(
            parse_package_references(CSPROJ),
            vec!["Newtonsoft.Json", "Serilog"]
        );
    }

    #[test]
    fn packages_config_ids() {
        let xml = r#"<?xml version="1.0"?>
<packages>
  <package id="NUnit" version="3.13.3" targetFramework="net48" />
</packages>"#;
        assert_eq!(parse_packages_config(xml), vec!["NUnit"]);
    }

    #[test]
    fn project_json_dependencies() {
        let body = r#"{"dependencies": {"Microsoft.NETCore.App": "1.0.0"}}"#;
        assert_eq!(parse_project_json(body), vec!["Microsoft.NETCore.App"]);
    }

    #[test]
    fn lockfile_scan_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("Test.csproj"),
            r#"<Project><ItemGroup><PackageReference Include="Newtonsoft.Json" Version="13.0.3"/></ItemGroup></Project>"#,
        )
        .unwrap();
        std::fs::write(tmp.path().join(LOCKFILE), "{}").unwrap();

        let found = scan_source(
            tmp.path(),
            &ScanOptions {
                require_lockfile: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(found, vec!["Newtonsoft.Json"]);

        // Removing the lockfile makes the same scan a file error.
        std::fs::remove_file(tmp.path().join(LOCKFILE)).unwrap();
        let result = scan_source(
            tmp.path(),
            &ScanOptions {
                require_lockfile: true,
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn manifest_entries_carry_versions() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("App.csproj"), CSPROJ).unwrap();
        let entries = manifest_entries(tmp.path(), false);
        assert!(entries.contains(&(
            "Newtonsoft.Json".to_string(),
            Some("13.0.3".to_string())
        )));
    }
}
