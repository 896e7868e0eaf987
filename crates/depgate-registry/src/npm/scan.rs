//! npm source scanner: `package.json` plus lockfile discovery.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use depgate_util::errors::DepGateError;

use crate::ScanOptions;

use super::lockfile;

const MANIFEST: &str = "package.json";
const LOCKFILES: &[&str] = &["package-lock.json", "yarn.lock", "bun.lock"];

/// Discover dependency identifiers under a directory.
///
/// With a lockfile present and `direct_only` off, the result is the full
/// transitive closure from the lockfile (root package excluded); otherwise
/// `dependencies ∪ devDependencies` from each manifest.
pub fn scan_source(dir: &Path, opts: &ScanOptions) -> Result<Vec<String>, DepGateError> {
    tracing::info!(dir = %dir.display(), "npm scanner engaged");

    let manifests = find_manifests(dir, opts.recursive)?;
    let mut found: BTreeSet<String> = BTreeSet::new();
    let mut any_lockfile = false;

    for manifest_path in &manifests {
        let body = std::fs::read_to_string(manifest_path)?;
        let manifest: Value =
            serde_json::from_str(&body).map_err(|e| DepGateError::Manifest {
                message: format!("invalid {}: {e}", manifest_path.display()),
            })?;
        let root_name = manifest.get("name").and_then(Value::as_str);

        let manifest_dir = manifest_path.parent().unwrap_or(dir);
        let lock = find_lockfile(manifest_dir);
        if lock.is_some() {
            any_lockfile = true;
        }

        match lock {
            Some(lock_path) if !opts.direct_only => {
                let content = std::fs::read_to_string(&lock_path)?;
                let names = match lock_path.file_name().and_then(|n| n.to_str()) {
                    Some("yarn.lock") => lockfile::parse_yarn_lock(&content),
                    Some("bun.lock") => lockfile::parse_bun_lock(&content),
                    _ => lockfile::parse_package_lock(&content, root_name),
                };
                found.extend(names);
            }
            _ => {
                for section in ["dependencies", "devDependencies"] {
                    if let Some(deps) = manifest.get(section).and_then(Value::as_object) {
                        found.extend(deps.keys().cloned());
                    }
                }
            }
        }
    }

    if opts.require_lockfile && !any_lockfile {
        return Err(DepGateError::Manifest {
            message: format!("no npm lockfile found under {}", dir.display()),
        });
    }

    Ok(found.into_iter().collect())
}

/// Direct dependencies with their raw specs, for version resolution.
pub fn manifest_entries(dir: &Path, recursive: bool) -> Vec<(String, Option<String>)> {
    let Ok(manifests) = find_manifests(dir, recursive) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for path in manifests {
        let Ok(body) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(manifest) = serde_json::from_str::<Value>(&body) else {
            continue;
        };
        for section in ["dependencies", "devDependencies"] {
            if let Some(deps) = manifest.get(section).and_then(Value::as_object) {
                for (name, spec) in deps {
                    entries.push((
                        name.clone(),
                        spec.as_str().map(|s| s.to_string()),
                    ));
                }
            }
        }
    }
    entries
}

fn find_manifests(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, DepGateError> {
    if !recursive {
        let path = dir.join(MANIFEST);
        if !path.is_file() {
            return Err(DepGateError::Manifest {
                message: format!("{MANIFEST} not found in {}", dir.display()),
            });
        }
        return Ok(vec![path]);
    }

    let mut manifests = Vec::new();
    walk(dir, &mut |path| {
        if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST) {
            manifests.push(path.to_path_buf());
        }
    });
    if manifests.is_empty() {
        return Err(DepGateError::Manifest {
            message: format!("no {MANIFEST} found under {}", dir.display()),
        });
    }
    Ok(manifests)
}

fn find_lockfile(dir: &Path) -> Option<PathBuf> {
    LOCKFILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Depth-first walk skipping `node_modules` and hidden directories.
pub(crate) fn walk(dir: &Path, visit: &mut dyn FnMut(&Path)) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name == "node_modules" || name.starts_with('.') {
                continue;
            }
            walk(&path, visit);
        } else {
            visit(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn direct_deps_without_lockfile() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "package.json",
            r#"{"name": "app", "dependencies": {"lodash": "^4.17.0"}, "devDependencies": {"jest": "^29.0.0"}}"#,
        );
        let found = scan_source(tmp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(found, vec!["jest", "lodash"]);
    }

    #[test]
    fn lockfile_closure_when_not_direct_only() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "package.json",
            r#"{"name": "app", "dependencies": {"express": "^4.0.0"}}"#,
        );
        write(
            tmp.path(),
            "package-lock.json",
            r#"{
                "name": "app",
                "lockfileVersion": 3,
                "packages": {
                    "": {"name": "app"},
                    "node_modules/express": {},
                    "node_modules/accepts": {}
                }
            }"#,
        );
        let found = scan_source(tmp.path(), &ScanOptions::default()).unwrap();
        assert_eq!(found, vec!["accepts", "express"]);

        let direct = scan_source(
            tmp.path(),
            &ScanOptions {
                direct_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(direct, vec!["express"]);
    }

    #[test]
    fn require_lockfile_fails_without_one() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "package.json", r#"{"name": "app"}"#);
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
    fn missing_manifest_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(scan_source(tmp.path(), &ScanOptions::default()).is_err());
    }

    #[test]
    fn recursive_scan_finds_nested_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("services/api");
        std::fs::create_dir_all(&nested).unwrap();
        write(
            &nested,
            "package.json",
            r#"{"name": "api", "dependencies": {"fastify": "^4.0.0"}}"#,
        );
        let found = scan_source(
            tmp.path(),
            &ScanOptions {
                recursive: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(found, vec!["fastify"]);
    }
}
