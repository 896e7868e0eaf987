//! PyPI source scanner: `pyproject.toml` / `requirements.txt` with
//! uv/poetry lockfile selection.

use std::collections::BTreeSet;
use std::path::Path;

use depgate_core::request::normalize_pypi_name;
use depgate_util::errors::DepGateError;

use crate::ScanOptions;

use super::lockfile;

/// Discover dependency identifiers under a directory.
///
/// `pyproject.toml` is preferred over `requirements.txt`. Lockfile
/// selection follows the tool section: `[tool.uv]` ⇒ `uv.lock`,
/// `[tool.poetry]` ⇒ `poetry.lock`; with both lockfiles present and no
/// tool section, `uv.lock` wins with a warning.
pub fn scan_source(dir: &Path, opts: &ScanOptions) -> Result<Vec<String>, DepGateError> {
    tracing::info!(dir = %dir.display(), "pypi scanner engaged");

    let pyproject_path = dir.join("pyproject.toml");
    let requirements_path = dir.join("requirements.txt");

    if pyproject_path.is_file() {
        return scan_pyproject(dir, &pyproject_path, opts);
    }
    if requirements_path.is_file() {
        if opts.require_lockfile && select_lockfile(dir, None).is_none() {
            return Err(DepGateError::Manifest {
                message: format!("no Python lockfile found under {}", dir.display()),
            });
        }
        let body = std::fs::read_to_string(&requirements_path)?;
        let names: BTreeSet<String> = lockfile::parse_requirements(&body)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        return Ok(names.into_iter().collect());
    }

    tracing::warn!(dir = %dir.display(), "no pyproject.toml or requirements.txt found");
    Err(DepGateError::Manifest {
        message: format!(
            "no pyproject.toml or requirements.txt in {}",
            dir.display()
        ),
    })
}

fn scan_pyproject(
    dir: &Path,
    manifest_path: &Path,
    opts: &ScanOptions,
) -> Result<Vec<String>, DepGateError> {
    let body = std::fs::read_to_string(manifest_path)?;
    let manifest: toml::Value = toml::from_str(&body).map_err(|e| DepGateError::Manifest {
        message: format!("invalid {}: {e}", manifest_path.display()),
    })?;

    let tool = manifest.get("tool");
    let uses_uv = tool.and_then(|t| t.get("uv")).is_some();
    let uses_poetry = tool.and_then(|t| t.get("poetry")).is_some();
    let tool_hint = match (uses_uv, uses_poetry) {
        (true, _) => Some("uv.lock"),
        (false, true) => Some("poetry.lock"),
        _ => None,
    };

    let root_name = manifest
        .get("project")
        .and_then(|p| p.get("name"))
        .and_then(toml::Value::as_str)
        .or_else(|| {
            tool.and_then(|t| t.get("poetry"))
                .and_then(|p| p.get("name"))
                .and_then(toml::Value::as_str)
        });

    let lock_path = select_lockfile(dir, tool_hint);
    if opts.require_lockfile && lock_path.is_none() {
        return Err(DepGateError::Manifest {
            message: format!("no Python lockfile found under {}", dir.display()),
        });
    }

    if let (Some(lock_path), false) = (&lock_path, opts.direct_only) {
        let content = std::fs::read_to_string(lock_path)?;
        return Ok(lockfile::parse_toml_lock(&content, root_name));
    }

    Ok(direct_dependencies(&manifest))
}

fn select_lockfile(dir: &Path, tool_hint: Option<&str>) -> Option<std::path::PathBuf> {
    let uv = dir.join("uv.lock");
    let poetry = dir.join("poetry.lock");

    if let Some(hint) = tool_hint {
        let hinted = dir.join(hint);
        if hinted.is_file() {
            return Some(hinted);
        }
    }
    match (uv.is_file(), poetry.is_file()) {
        (true, true) => {
            tracing::warn!("both uv.lock and poetry.lock present; preferring uv.lock");
            Some(uv)
        }
        (true, false) => Some(uv),
        (false, true) => Some(poetry),
        (false, false) => None,
    }
}

/// Direct dependencies from `[project.dependencies]`,
/// `[project.optional-dependencies]`, and `[tool.poetry.dependencies]`.
fn direct_dependencies(manifest: &toml::Value) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();

    if let Some(project) = manifest.get("project") {
        if let Some(deps) = project.get("dependencies").and_then(toml::Value::as_array) {
            for dep in deps.iter().filter_map(toml::Value::as_str) {
                if let Some((name, _)) = lockfile::parse_requirements(dep).into_iter().next() {
                    names.insert(name);
                }
            }
        }
        if let Some(groups) = project
            .get("optional-dependencies")
            .and_then(toml::Value::as_table)
        {
            for deps in groups.values().filter_map(toml::Value::as_array) {
                for dep in deps.iter().filter_map(toml::Value::as_str) {
                    if let Some((name, _)) = lockfile::parse_requirements(dep).into_iter().next() {
                        names.insert(name);
                    }
                }
            }
        }
    }

    if let Some(deps) = manifest
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_table)
    {
        for name in deps.keys() {
            if name != "python" {
                names.insert(normalize_pypi_name(name));
            }
        }
    }

    names.into_iter().collect()
}

/// Direct dependencies with their raw specs, for version resolution.
pub fn manifest_entries(dir: &Path) -> Vec<(String, Option<String>)> {
    let requirements_path = dir.join("requirements.txt");
    if let Ok(body) = std::fs::read_to_string(&requirements_path) {
        return lockfile::parse_requirements(&body);
    }
    let pyproject_path = dir.join("pyproject.toml");
    let Ok(body) = std::fs::read_to_string(&pyproject_path) else {
        return Vec::new();
    };
    let Ok(manifest) = toml::from_str::<toml::Value>(&body) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    if let Some(deps) = manifest
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_array)
    {
        for dep in deps.iter().filter_map(toml::Value::as_str) {
            entries.extend(lockfile::parse_requirements(dep));
        }
    }
    entries
}
