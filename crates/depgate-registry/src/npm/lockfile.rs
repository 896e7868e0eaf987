//! Lockfile parsers for the npm ecosystem.
//!
//! Extracts the full transitive closure (direct + transitive) from
//! `package-lock.json` v1/v2/v3, `yarn.lock` (classic and berry), and
//! `bun.lock` (JSONC).

use std::collections::BTreeSet;

use serde_json::Value;

/// All dependency names from a `package-lock.json`, root excluded.
pub fn parse_package_lock(content: &str, root_name: Option<&str>) -> Vec<String> {
    let Ok(data) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };
    let version = data
        .get("lockfileVersion")
        .and_then(Value::as_i64)
        .unwrap_or(1);

    let mut packages: BTreeSet<String> = BTreeSet::new();

    if version >= 2 {
        if let Some(map) = data.get("packages").and_then(Value::as_object) {
            for (path, info) in map {
                if path.is_empty() {
                    continue; // the root project
                }
                if let Some(name) = info.get("name").and_then(Value::as_str) {
                    packages.insert(name.to_string());
                    continue;
                }
                if let Some(name) = name_from_lock_path(path) {
                    packages.insert(name);
                }
            }
        }
    }

    // v1 structure; also kept by some v2 lockfiles for compatibility.
    if let Some(deps) = data.get("dependencies").and_then(Value::as_object) {
        collect_nested(deps, &mut packages);
    }

    if let Some(root) = root_name {
        packages.remove(root);
    }
    packages.into_iter().collect()
}

fn collect_nested(deps: &serde_json::Map<String, Value>, out: &mut BTreeSet<String>) {
    for (name, info) in deps {
        out.insert(name.clone());
        if let Some(nested) = info.get("dependencies").and_then(Value::as_object) {
            collect_nested(nested, out);
        }
    }
}

/// `node_modules/a/node_modules/@scope/b` → `@scope/b`.
fn name_from_lock_path(path: &str) -> Option<String> {
    let tail = match path.rfind("node_modules/") {
        Some(idx) => &path[idx + "node_modules/".len()..],
        None => path,
    };
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}

/// All dependency names from a `yarn.lock` (classic or berry).
///
/// Entry headers look like `"lodash@^4.17.0", "lodash@^4.17.19":` in
/// classic and `"lodash@npm:^4.17.0":` in berry; the package name is
/// everything before the last `@`.
pub fn parse_yarn_lock(content: &str) -> Vec<String> {
    let mut packages: BTreeSet<String> = BTreeSet::new();

    for line in content.lines() {
        let trimmed = line.trim_end();
        // Entry headers start at column zero and end with a colon.
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with(' ')
            || trimmed.starts_with('\t')
            || !trimmed.ends_with(':')
        {
            continue;
        }
        let header = trimmed.trim_end_matches(':');
        if header == "__metadata" {
            continue;
        }
        for selector in header.split(',') {
            let selector = selector.trim().trim_matches('"');
            if let Some(name) = name_from_selector(selector) {
                packages.insert(name);
            }
        }
    }

    packages.into_iter().collect()
}

/// `@scope/pkg@npm:^1.0.0` → `@scope/pkg`; `lodash@^4` → `lodash`.
fn name_from_selector(selector: &str) -> Option<String> {
    let at = selector.rfind('@')?;
    if at == 0 {
        // Bare scoped name without a range; unexpected but tolerated.
        return Some(selector.to_string());
    }
    let name = &selector[..at];
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// All dependency names from a `bun.lock` (JSONC: comments and trailing
/// commas are tolerated).
pub fn parse_bun_lock(content: &str) -> Vec<String> {
    let cleaned = strip_jsonc(content);
    let Ok(data) = serde_json::from_str::<Value>(&cleaned) else {
        return Vec::new();
    };
    let mut packages: BTreeSet<String> = BTreeSet::new();
    if let Some(map) = data.get("packages").and_then(Value::as_object) {
        for key in map.keys() {
            if !key.is_empty() {
                packages.insert(key.clone());
            }
        }
    }
    packages.into_iter().collect()
}

/// Remove `//` and `/* */` comments plus trailing commas, preserving
/// string contents.
fn strip_jsonc(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let bytes: Vec<char> = content.chars().collect();
    let mut i = 0;
    let mut in_string = false;

    while i < bytes.len() {
        let ch = bytes[i];
        if in_string {
            out.push(ch);
            if ch == '\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
                i += 1;
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '/' => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '*' => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == '*' && bytes[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            ',' => {
                // Drop the comma if the next non-whitespace closes a scope.
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_whitespace() {
                    j += 1;
                }
                if j < bytes.len() && (bytes[j] == '}' || bytes[j] == ']') {
                    i += 1;
                } else {
                    out.push(ch);
                    i += 1;
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}
