//! npm/NuGet range-syntax normalization on top of the `semver` crate.
//!
//! `semver::VersionReq` natively understands `^`, `~`, comparators, and
//! x-wildcards, but npm specs also use `||` unions, hyphen ranges, and
//! space-separated comparator lists. This module rewrites those forms into
//! comma-joined requirement strings before parsing.

use std::sync::OnceLock;

use regex::Regex;
use semver::{Version, VersionReq};

fn hyphen_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([0-9A-Za-z.+\-]+)\s+-\s+([0-9A-Za-z.+\-]+)\s*$")
            .expect("valid hyphen-range regex")
    })
}

/// Rewrite one `||`-free alternative into `semver`-compatible syntax.
///
/// Hyphen ranges become `>=a, <=b`; space-separated comparators become
/// comma-joined; everything else passes through untouched.
pub fn normalize_alternative(spec: &str) -> String {
    let spec = spec.trim();

    if let Some(caps) = hyphen_range_re().captures(spec) {
        return format!(">={}, <={}", &caps[1], &caps[2]);
    }

    // npm writes ">=1.2.3 <2.0.0"; semver wants ">=1.2.3, <2.0.0".
    if spec.contains(char::is_whitespace) && !spec.contains(',') {
        return spec.split_whitespace().collect::<Vec<_>>().join(", ");
    }

    spec.to_string()
}

/// Parse a full npm-style range into a set of alternatives (`||` union).
///
/// A candidate matches when any alternative matches. Returns `None` when
/// any alternative fails to parse.
pub fn parse_range(spec: &str) -> Option<Vec<VersionReq>> {
    spec.split("||")
        .map(|alt| {
            let alt = alt.trim();
            if alt.is_empty() || alt == "*" || alt == "x" || alt == "X" {
                return VersionReq::parse("*").ok();
            }
            VersionReq::parse(alt)
                .or_else(|_| VersionReq::parse(&normalize_alternative(alt)))
                .ok()
        })
        .collect()
}

/// True when any alternative in the union matches.
pub fn range_matches(alternatives: &[VersionReq], version: &Version) -> bool {
    alternatives.iter().any(|req| req.matches(version))
}

/// Highest matching candidate under npm semantics.
///
/// Pre-release candidates are skipped unless `include_prerelease` is set.
pub fn pick_highest_matching(
    candidates: &[String],
    alternatives: &[VersionReq],
    include_prerelease: bool,
) -> Option<String> {
    candidates
        .iter()
        .filter_map(|raw| Version::parse(raw).ok().map(|v| (raw, v)))
        .filter(|(_, v)| include_prerelease || v.pre.is_empty())
        .filter(|(_, v)| range_matches(alternatives, v))
        .max_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(raw, _)| raw.clone())
}

/// Highest non-prerelease candidate; falls back to the highest pre-release
/// when nothing stable parses.
pub fn pick_highest(candidates: &[String]) -> Option<String> {
    let parsed: Vec<(&String, Version)> = candidates
        .iter()
        .filter_map(|raw| Version::parse(raw).ok().map(|v| (raw, v)))
        .collect();
    let stable = parsed
        .iter()
        .filter(|(_, v)| v.pre.is_empty())
        .max_by(|(_, a), (_, b)| a.cmp(b));
    stable
        .or_else(|| parsed.iter().max_by(|(_, a), (_, b)| a.cmp(b)))
        .map(|(raw, _)| (*raw).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn caret_and_tilde_parse_natively() {
        let range = parse_range("^1.2.3").unwrap();
        assert!(range_matches(&range, &Version::parse("1.9.0").unwrap()));
        assert!(!range_matches(&range, &Version::parse("2.0.0").unwrap()));

        let range = parse_range("~1.2.3").unwrap();
        assert!(range_matches(&range, &Version::parse("1.2.9").unwrap()));
        assert!(!range_matches(&range, &Version::parse("1.3.0").unwrap()));
    }

    #[test]
    fn hyphen_range_normalizes() {
        let range = parse_range("1.2.3 - 1.4.5").unwrap();
        assert!(range_matches(&range, &Version::parse("1.3.0").unwrap()));
        assert!(range_matches(&range, &Version::parse("1.4.5").unwrap()));
        assert!(!range_matches(&range, &Version::parse("1.5.0").unwrap()));
    }

    #[test]
    fn space_separated_comparators() {
        let range = parse_range(">=1.2.0 <2.0.0").unwrap();
        assert!(range_matches(&range, &Version::parse("1.9.9").unwrap()));
        assert!(!range_matches(&range, &Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn union_alternatives() {
        let range = parse_range("^1.0.0 || ^3.0.0").unwrap();
        assert!(range_matches(&range, &Version::parse("1.5.0").unwrap()));
        assert!(range_matches(&range, &Version::parse("3.1.0").unwrap()));
        assert!(!range_matches(&range, &Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn wildcard_matches_everything_stable() {
        let range = parse_range("*").unwrap();
        let picked = pick_highest_matching(
            &candidates(&["1.0.0", "2.0.0", "3.0.0-beta.1"]),
            &range,
            false,
        );
        assert_eq!(picked.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn prerelease_opt_in() {
        let range = parse_range(">=3.0.0-alpha").unwrap();
        let list = candidates(&["2.0.0", "3.0.0-beta.1"]);
        assert_eq!(pick_highest_matching(&list, &range, false), None);
        assert_eq!(
            pick_highest_matching(&list, &range, true).as_deref(),
            Some("3.0.0-beta.1")
        );
    }

    #[test]
    fn highest_skips_prereleases_when_stable_exists() {
        let list = candidates(&["1.0.0", "2.0.0-rc.1"]);
        assert_eq!(pick_highest(&list).as_deref(), Some("1.0.0"));

        let only_pre = candidates(&["2.0.0-rc.1", "2.0.0-rc.2"]);
        assert_eq!(pick_highest(&only_pre).as_deref(), Some("2.0.0-rc.2"));
    }

    #[test]
    fn invalid_alternative_fails_whole_range() {
        assert!(parse_range("^1.0.0 || not@a@range").is_none());
    }
}
