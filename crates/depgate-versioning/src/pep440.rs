//! PEP 440 version parsing and ordering for PyPI resolution.
//!
//! Covers the grammar the registries actually serve: optional epoch
//! (`1!2.0`), dotted release segments, pre-releases (`a`/`b`/`rc` with the
//! `alpha`/`beta`/`c`/`pre`/`preview` spellings), post-releases, dev
//! releases, and local version labels. Ordering follows PEP 440:
//! `1.0.dev1 < 1.0a1 < 1.0 < 1.0.post1`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// A parsed PEP 440 version.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pep440Version {
    pub original: String,
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum PreKind {
    Alpha,
    Beta,
    Rc,
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^
            v?
            (?:(?P<epoch>\d+)!)?
            (?P<release>\d+(?:\.\d+)*)
            (?:[-_.]?(?P<pre_kind>a|b|c|rc|alpha|beta|pre|preview)[-_.]?(?P<pre_n>\d*))?
            (?:(?:-(?P<post_implicit>\d+))|(?:[-_.]?(?:post|rev|r)[-_.]?(?P<post_n>\d*)))?
            (?:[-_.]?dev[-_.]?(?P<dev_n>\d*))?
            (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
            $",
        )
        .expect("valid PEP 440 regex")
    })
}

impl Pep440Version {
    /// Parse a version string; returns `None` when it is not PEP 440.
    pub fn parse(version: &str) -> Option<Self> {
        let text = version.trim().to_lowercase();
        let caps = version_re().captures(&text)?;

        let epoch = caps
            .name("epoch")
            .map_or(Some(0), |m| m.as_str().parse().ok())?;
        let release = caps
            .name("release")?
            .as_str()
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let pre = match caps.name("pre_kind") {
            Some(kind) => {
                let kind = match kind.as_str() {
                    "a" | "alpha" => PreKind::Alpha,
                    "b" | "beta" => PreKind::Beta,
                    _ => PreKind::Rc,
                };
                let n = caps
                    .name("pre_n")
                    .map_or("", |m| m.as_str())
                    .parse()
                    .unwrap_or(0);
                Some((kind, n))
            }
            None => None,
        };

        let post = if let Some(n) = caps.name("post_implicit") {
            Some(n.as_str().parse().unwrap_or(0))
        } else {
            caps.name("post_n")
                .map(|m| m.as_str().parse().unwrap_or(0))
        };

        let dev = caps.name("dev_n").map(|m| m.as_str().parse().unwrap_or(0));
        let local = caps.name("local").map(|m| m.as_str().to_string());

        Some(Self {
            original: version.trim().to_string(),
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// True for pre-releases and dev releases.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Release segments padded to `len` with zeros.
    fn padded_release(&self, len: usize) -> Vec<u64> {
        let mut padded = self.release.clone();
        padded.resize(len, 0);
        padded
    }

    /// Sort key for the pre/post/dev phase of this release number.
    fn phase_key(&self) -> (PhaseKey, Option<u64>, DevKey) {
        let phase = match (&self.pre, &self.post, &self.dev) {
            (Some((kind, n)), _, _) => PhaseKey::Pre(*kind, *n),
            (None, None, Some(_)) => PhaseKey::DevOnly,
            _ => PhaseKey::Final,
        };
        let dev = match self.dev {
            Some(n) => DevKey::Dev(n),
            None => DevKey::Final,
        };
        (phase, self.post, dev)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum PhaseKey {
    DevOnly,
    Pre(PreKind, u64),
    Final,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum DevKey {
    Dev(u64),
    Final,
}

impl Ord for Pep440Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        (self.epoch, self.padded_release(len), self.phase_key(), &self.local).cmp(&(
            other.epoch,
            other.padded_release(len),
            other.phase_key(),
            &other.local,
        ))
    }
}

impl PartialOrd for Pep440Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Pep440Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// A single PEP 440 specifier clause, e.g. `>=1.0` or `==1.4.*`.
#[derive(Debug, Clone)]
pub struct Specifier {
    op: SpecOp,
    version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Compatible,
    ArbitraryEq,
}

impl Specifier {
    fn parse(clause: &str) -> Option<Self> {
        let clause = clause.trim();
        let (op, rest) = if let Some(rest) = clause.strip_prefix("===") {
            (SpecOp::ArbitraryEq, rest)
        } else if let Some(rest) = clause.strip_prefix("==") {
            (SpecOp::Eq, rest)
        } else if let Some(rest) = clause.strip_prefix("!=") {
            (SpecOp::Ne, rest)
        } else if let Some(rest) = clause.strip_prefix("~=") {
            (SpecOp::Compatible, rest)
        } else if let Some(rest) = clause.strip_prefix("<=") {
            (SpecOp::Le, rest)
        } else if let Some(rest) = clause.strip_prefix(">=") {
            (SpecOp::Ge, rest)
        } else if let Some(rest) = clause.strip_prefix('<') {
            (SpecOp::Lt, rest)
        } else if let Some(rest) = clause.strip_prefix('>') {
            (SpecOp::Gt, rest)
        } else {
            return None;
        };
        let version = rest.trim();
        if version.is_empty() {
            return None;
        }
        Some(Self {
            op,
            version: version.to_string(),
        })
    }

    fn matches(&self, candidate: &Pep440Version) -> bool {
        match self.op {
            SpecOp::ArbitraryEq => candidate.original.eq_ignore_ascii_case(&self.version),
            SpecOp::Eq => {
                if let Some(prefix) = self.version.strip_suffix(".*") {
                    match Pep440Version::parse(prefix) {
                        Some(parsed) => release_prefix_matches(&parsed, candidate),
                        None => false,
                    }
                } else {
                    Pep440Version::parse(&self.version)
                        .is_some_and(|parsed| parsed.cmp(candidate) == Ordering::Equal)
                }
            }
            SpecOp::Ne => !Specifier {
                op: SpecOp::Eq,
                version: self.version.clone(),
            }
            .matches(candidate),
            SpecOp::Le => compare(candidate, &self.version)
                .is_some_and(|ord| ord != Ordering::Greater),
            SpecOp::Ge => compare(candidate, &self.version).is_some_and(|ord| ord != Ordering::Less),
            SpecOp::Lt => compare(candidate, &self.version) == Some(Ordering::Less),
            SpecOp::Gt => compare(candidate, &self.version) == Some(Ordering::Greater),
            SpecOp::Compatible => {
                // ~=X.Y.Z is >=X.Y.Z combined with ==X.Y.*
                let Some(floor) = Pep440Version::parse(&self.version) else {
                    return false;
                };
                if floor.release.len() < 2 {
                    return false;
                }
                if candidate.cmp(&floor) == Ordering::Less {
                    return false;
                }
                let mut truncated = floor.clone();
                truncated.release.pop();
                release_prefix_matches(&truncated, candidate)
            }
        }
    }
}

fn compare(candidate: &Pep440Version, against: &str) -> Option<Ordering> {
    Pep440Version::parse(against).map(|parsed| candidate.cmp(&parsed))
}

fn release_prefix_matches(prefix: &Pep440Version, candidate: &Pep440Version) -> bool {
    if candidate.epoch != prefix.epoch {
        return false;
    }
    let padded = candidate.padded_release(prefix.release.len());
    padded[..prefix.release.len()] == prefix.release[..]
}

/// Parse a comma-separated PEP 440 specifier set. All clauses must match.
pub fn parse_specifiers(spec: &str) -> Option<Vec<Specifier>> {
    spec.split(',')
        .filter(|clause| !clause.trim().is_empty())
        .map(Specifier::parse)
        .collect()
}

/// True when every clause in the set matches the candidate.
pub fn specifiers_match(specifiers: &[Specifier], candidate: &Pep440Version) -> bool {
    specifiers.iter().all(|spec| spec.matches(candidate))
}
