//! Lockfile and requirements parsers for the PyPI ecosystem.

use std::collections::BTreeSet;

use serde::Deserialize;

use depgate_core::request::normalize_pypi_name;

#[derive(Debug, Deserialize)]
struct TomlLockfile {
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
}

/// Package names from a `uv.lock` or `poetry.lock` (both use
/// `[[package]]` tables), PEP-503 normalized, root excluded when named.
pub fn parse_toml_lock(content: &str, root_name: Option<&str>) -> Vec<String> {
    let Ok(lockfile) = toml::from_str::<TomlLockfile>(content) else {
        return Vec::new();
    };
    let root = root_name.map(normalize_pypi_name);
    let mut names: BTreeSet<String> = lockfile
        .package
        .iter()
        .map(|pkg| normalize_pypi_name(&pkg.name))
        .collect();
    if let Some(root) = root {
        names.remove(&root);
    }
    names.into_iter().collect()
}

/// `(name, spec)` pairs from a `requirements.txt`.
///
/// Comments, blank lines, options (`-r`, `--hash`), and environment
/// markers are dropped; extras are stripped from names.
pub fn parse_requirements(content: &str) -> Vec<(String, Option<String>)> {
    let mut entries = Vec::new();
    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('-') {
            continue;
        }
        // Drop environment markers.
        let line = line.split(';').next().unwrap_or("").trim();

        let split_at = line
            .char_indices()
            .find(|(_, c)| matches!(c, '=' | '<' | '>' | '~' | '!'))
            .map(|(i, _)| i);
        let (name_part, spec) = match split_at {
            Some(idx) => (&line[..idx], Some(line[idx..].trim().to_string())),
            None => (line, None),
        };

        let name = name_part.split('[').next().unwrap_or("").trim();
        if name.is_empty() {
            continue;
        }
        entries.push((normalize_pypi_name(name), spec));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_lock_package_tables() {
        let lock = r#"
version = 1

[[package]]
name = "Requests"
version = "2.31.0"

[[package]]
name = "charset_normalizer"
version = "3.0.0"

[[package]]
name = "myapp"
version = "0.1.0"
"#;
        let names = parse_toml_lock(lock, Some("myapp"));
        assert_eq!(names, vec!["charset-normalizer", "requests"]);
    }

    #[test]
    fn invalid_toml_parses_to_empty() {
        assert!(parse_toml_lock("not [ valid", None).is_empty());
    }

    #[test]
    fn requirements_lines() {
        let body = r#"
# comment
requests>=2.0,<3.0
Flask==2.3.2  # pinned
uvicorn[standard]~=0.23
pyyaml
-r other.txt
importlib-metadata; python_version < "3.8"
"#;
        let entries = parse_requirements(body);
        assert_eq!(
            entries,
            vec![
                ("requests".to_string(), Some(">=2.0,<3.0".to_string())),
                ("flask".to_string(), Some("==2.3.2".to_string())),
                ("uvicorn".to_string(), Some("~=0.23".to_string())),
                ("pyyaml".to_string(), None),
                ("importlib-metadata".to_string(), None),
            ]
        );
    }
}
