//! Maven version parsing, comparison, and range matching.
//!
//! Maven ordering differs from semver: segments split on `.` and `-`,
//! numeric segments compare as numbers, and string qualifiers have a
//! defined order (`alpha` < `beta` < `milestone` < `rc` < `snapshot` <
//! `""` (release) < `sp`). A `-SNAPSHOT` version sorts before its release.

use std::cmp::Ordering;
use std::fmt;

/// A parsed Maven version with comparable segments.
#[derive(Debug, Clone)]
pub struct MavenVersion {
    pub original: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Segment {
    Numeric(u64),
    Qualifier(QualifierKind),
    Text(String),
}

/// Well-known Maven qualifiers with defined ordering.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
enum QualifierKind {
    Alpha,
    Beta,
    Milestone,
    Rc,
    Snapshot,
    Release,
    Sp,
}

impl MavenVersion {
    pub fn parse(version: &str) -> Self {
        Self {
            original: version.to_string(),
            segments: split_segments(version),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.original.ends_with("-SNAPSHOT")
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let ord = compare_positions(self.segments.get(i), other.segments.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_positions(a: Option<&Segment>, b: Option<&Segment>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(seg), None) => compare_to_padding(seg),
        (None, Some(seg)) => compare_to_padding(seg).reverse(),
        (Some(a), Some(b)) => compare_pair(a, b),
    }
}

// Trailing positions compare against an implicit empty (release) segment.
fn compare_to_padding(seg: &Segment) -> Ordering {
    match seg {
        Segment::Numeric(0) => Ordering::Equal,
        Segment::Numeric(_) => Ordering::Greater,
        Segment::Qualifier(q) => q.cmp(&QualifierKind::Release),
        Segment::Text(s) if s.is_empty() => Ordering::Equal,
        Segment::Text(_) => Ordering::Less,
    }
}

fn compare_pair(a: &Segment, b: &Segment) -> Ordering {
    use Segment::*;
    match (a, b) {
        (Numeric(a), Numeric(b)) => a.cmp(b),
        (Qualifier(a), Qualifier(b)) => a.cmp(b),
        (Numeric(_), Qualifier(_)) => Ordering::Greater,
        (Qualifier(_), Numeric(_)) => Ordering::Less,
        (Numeric(_), Text(_)) => Ordering::Greater,
        (Text(_), Numeric(_)) => Ordering::Less,
        (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Qualifier(q), Text(_)) => {
            if *q >= QualifierKind::Release {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Text(_), Qualifier(q)) => {
            if *q >= QualifierKind::Release {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
    }
}

fn split_segments(version: &str) -> Vec<Segment> {
    version
        .split(['.', '-'])
        .filter(|token| !token.is_empty())
        .map(classify)
        .collect()
}

fn classify(token: &str) -> Segment {
    if let Ok(n) = token.parse::<u64>() {
        return Segment::Numeric(n);
    }
    match token.to_lowercase().as_str() {
        "alpha" | "a" => Segment::Qualifier(QualifierKind::Alpha),
        "beta" | "b" => Segment::Qualifier(QualifierKind::Beta),
        "milestone" | "m" => Segment::Qualifier(QualifierKind::Milestone),
        "rc" | "cr" => Segment::Qualifier(QualifierKind::Rc),
        "snapshot" => Segment::Qualifier(QualifierKind::Snapshot),
        "" | "ga" | "final" | "release" => Segment::Qualifier(QualifierKind::Release),
        "sp" => Segment::Qualifier(QualifierKind::Sp),
        _ => Segment::Text(token.to_string()),
    }
}

/// An interval bound within a Maven range.
#[derive(Debug, Clone)]
pub struct Bound {
    pub version: MavenVersion,
    pub inclusive: bool,
}

/// One element of a Maven range expression.
///
/// `[1.2]` is a pin: it matches the exact version or any version with that
/// prefix (`1.2` matches `1.2.3`). Bracketed intervals carry bounds on
/// either side.
#[derive(Debug, Clone)]
pub enum RangeElement {
    Pin(String),
    Interval {
        lower: Option<Bound>,
        upper: Option<Bound>,
    },
}

impl RangeElement {
    pub fn contains(&self, candidate: &str) -> bool {
        match self {
            RangeElement::Pin(base) => {
                candidate == base || candidate.starts_with(&format!("{base}."))
            }
            RangeElement::Interval { lower, upper } => {
                let version = MavenVersion::parse(candidate);
                if let Some(bound) = lower {
                    let cmp = version.cmp(&bound.version);
                    if cmp == Ordering::Less || (!bound.inclusive && cmp == Ordering::Equal) {
                        return false;
                    }
                }
                if let Some(bound) = upper {
                    let cmp = version.cmp(&bound.version);
                    if cmp == Ordering::Greater || (!bound.inclusive && cmp == Ordering::Equal) {
                        return false;
                    }
                }
                true
            }
        }
    }
}

/// Parse a Maven range expression, including unions like `[1.0,2.0),[3.0,4.0]`.
///
/// Returns `None` for bare versions (not bracket syntax) or malformed input.
pub fn parse_range_union(spec: &str) -> Option<Vec<RangeElement>> {
    let spec = spec.trim();
    if !spec.starts_with(['[', '(']) {
        return None;
    }

    let mut elements = Vec::new();
    let mut rest = spec;
    while !rest.is_empty() {
        let rest_trimmed = rest.trim_start_matches(',').trim();
        if rest_trimmed.is_empty() {
            break;
        }
        if !rest_trimmed.starts_with(['[', '(']) {
            return None;
        }
        let close = rest_trimmed.find([']', ')'])?;
        let element = parse_single_range(&rest_trimmed[..=close])?;
        elements.push(element);
        rest = &rest_trimmed[close + 1..];
    }

    if elements.is_empty() {
        None
    } else {
        Some(elements)
    }
}

fn parse_single_range(range: &str) -> Option<RangeElement> {
    if range.len() < 2 {
        return None;
    }
    let open_inclusive = range.starts_with('[');
    let close_inclusive = range.ends_with(']');
    let inner = &range[1..range.len() - 1];

    match inner.split_once(',') {
        Some((lower, upper)) => {
            let lower = lower.trim();
            let upper = upper.trim();
            Some(RangeElement::Interval {
                lower: (!lower.is_empty()).then(|| Bound {
                    version: MavenVersion::parse(lower),
                    inclusive: open_inclusive,
                }),
                upper: (!upper.is_empty()).then(|| Bound {
                    version: MavenVersion::parse(upper),
                    inclusive: close_inclusive,
                }),
            })
        }
        None => {
            let base = inner.trim();
            if base.is_empty() {
                None
            } else {
                Some(RangeElement::Pin(base.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_and_three_part_ordering() {
        assert!(MavenVersion::parse("1.0") < MavenVersion::parse("2.0"));
        assert!(MavenVersion::parse("1.0.0") < MavenVersion::parse("1.0.1"));
        assert!(MavenVersion::parse("1.0.1") < MavenVersion::parse("1.1.0"));
    }

    #[test]
    fn qualifier_ordering() {
        let alpha = MavenVersion::parse("1.0-alpha");
        let beta = MavenVersion::parse("1.0-beta");
        let rc = MavenVersion::parse("1.0-rc");
        let release = MavenVersion::parse("1.0");
        let sp = MavenVersion::parse("1.0-sp");
        assert!(alpha < beta);
        assert!(beta < rc);
        assert!(rc < release);
        assert!(release < sp);
    }

    #[test]
    fn snapshot_before_release() {
        assert!(MavenVersion::parse("1.0-SNAPSHOT") < MavenVersion::parse("1.0"));
        assert!(MavenVersion::parse("1.0-SNAPSHOT").is_snapshot());
    }

    #[test]
    fn trailing_zeros_equal() {
        assert_eq!(MavenVersion::parse("1.0"), MavenVersion::parse("1.0.0"));
    }

    #[test]
    fn release_suffix_words() {
        assert_eq!(
            MavenVersion::parse("2.1"),
            MavenVersion::parse("2.1.RELEASE")
        );
        assert!(MavenVersion::parse("31.0-jre") < MavenVersion::parse("32.0-jre"));
    }

    #[test]
    fn interval_bounds() {
        let elements = parse_range_union("[1.0,2.0)").unwrap();
        assert_eq!(elements.len(), 1);
        assert!(elements[0].contains("1.0"));
        assert!(elements[0].contains("1.9.9"));
        assert!(!elements[0].contains("2.0"));
        assert!(!elements[0].contains("0.9"));
    }

    #[test]
    fn open_lower_bound() {
        let elements = parse_range_union("(,2.0)").unwrap();
        assert!(elements[0].contains("1.0"));
        assert!(!elements[0].contains("2.0"));
    }

    #[test]
    fn pin_matches_exact_or_prefix() {
        let elements = parse_range_union("[1.2]").unwrap();
        assert!(elements[0].contains("1.2"));
        assert!(elements[0].contains("1.2.3"));
        assert!(!elements[0].contains("1.20"));
        assert!(!elements[0].contains("1.3"));
    }

    #[test]
    fn union_of_ranges() {
        let elements = parse_range_union("[1.0,2.0),[3.0,4.0]").unwrap();
        assert_eq!(elements.len(), 2);
        assert!(elements[0].contains("1.5"));
        assert!(elements[1].contains("3.5"));
        assert!(!elements[0].contains("2.5"));
        assert!(!elements[1].contains("2.5"));
    }

    #[test]
    fn bare_version_is_not_a_range() {
        assert!(parse_range_union("1.0").is_none());
    }
}
