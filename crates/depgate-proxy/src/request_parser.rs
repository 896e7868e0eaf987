//! Request parser: package and version extraction from registry URLs.

use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

use depgate_core::ecosystem::Ecosystem;
use depgate_core::request::normalize_pypi_name;

/// Result of parsing a registry request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    /// `None` when the registry could not be determined.
    pub registry: Option<Ecosystem>,
    pub package_name: String,
    pub version: Option<String>,
    pub is_metadata_request: bool,
    pub is_tarball_request: bool,
    pub raw_path: String,
}

impl ParsedRequest {
    fn unknown(raw_path: &str, registry: Option<Ecosystem>) -> Self {
        Self {
            registry,
            package_name: String::new(),
            version: None,
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: raw_path.to_string(),
        }
    }
}

macro_rules! pattern {
    ($name:ident, $re:literal) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($re).expect("valid request pattern"))
        }
    };
}

// npm: /{name}, /@scope/name, /{name}/{version}, /{name}/-/{name}-{ver}.tgz
pattern!(npm_scoped_re, r"^/@([^/]+)/([^/]+)(?:/(.*))?$");
pattern!(npm_unscoped_re, r"^/([^/@][^/]*)(?:/(.*))?$");
pattern!(
    npm_tarball_re,
    r"^-/(.+)-(\d+\.\d+\.\d+(?:-[a-zA-Z0-9.\-]+)?(?:\+[a-zA-Z0-9.\-]+)?)\.tgz$"
);

// PyPI: /simple/{name}/, /pypi/{name}[/{ver}]/json, /packages/.../{file}
pattern!(pypi_simple_re, r"^/simple/([^/]+)/?$");
pattern!(pypi_json_re, r"^/pypi/([^/]+)(?:/([^/]+))?/json$");
// sdist/zip: greedy name; PEP 440 normalized versions never contain hyphens.
pattern!(
    pypi_sdist_re,
    r"^/packages/[^/]+/[^/]+/[^/]+/(.*)-(\d[^-]*)\.(?:tar\.gz|zip)$"
);
// wheel (PEP 427): {name}-{version}(-{build})?-{python}-{abi}-{platform}.whl
pattern!(
    pypi_wheel_re,
    r"^/packages/[^/]+/[^/]+/[^/]+/([^-]+)-([^-]+)(?:-[^-]+){3,4}\.whl$"
);

// Maven: group path has multiple segments; the artifact filename is
// checked against `{artifact}-{version}` programmatically since the
// pattern language has no backreferences.
pattern!(
    maven_artifact_re,
    r"^/(?:maven2/)?(.+)/([^/]+)/([^/]+)/([^/]+)\.(pom|jar|war|aar)$"
);
pattern!(
    maven_metadata_re,
    r"^/(?:maven2/)?((?:[^/]+/)*[^/]+)/([^/]+)/maven-metadata\.xml$"
);
pattern!(
    maven_version_metadata_re,
    r"^/(?:maven2/)?((?:[^/]+/)*[^/]+)/([^/]+)/([^/]+)/maven-metadata\.xml$"
);

// NuGet V3 registration and flat-container layouts.
pattern!(
    nuget_registration_re,
    r"^/v3/registration\d*(?:-[^/]+)?/([^/]+)(?:/index\.json|/(\d+\.\d+\.\d+[a-zA-Z0-9.\-]*)\.json)?$"
);
pattern!(
    nuget_flatcontainer_re,
    r"^/v3-flatcontainer/([^/]+)(?:/index\.json|/(\d+\.\d+\.\d+[a-zA-Z0-9.\-]*)/(.*))?$"
);

/// Parses registry request paths, optionally guided by a registry hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestParser;

impl RequestParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a request path.
    ///
    /// With a hint only that registry's patterns apply. Without one,
    /// auto-detection tries PyPI, Maven, and NuGet before npm, whose
    /// patterns are the most generic and must run last.
    pub fn parse(&self, path: &str, hint: Option<Ecosystem>) -> ParsedRequest {
        let decoded = percent_decode_str(path).decode_utf8_lossy().to_string();
        let path = if decoded.starts_with('/') {
            decoded
        } else {
            format!("/{decoded}")
        };

        if let Some(hint) = hint {
            return self
                .parse_for(&path, hint)
                .unwrap_or_else(|| ParsedRequest::unknown(&path, Some(hint)));
        }

        for registry in [
            Ecosystem::Pypi,
            Ecosystem::Maven,
            Ecosystem::Nuget,
            Ecosystem::Npm,
        ] {
            if let Some(parsed) = self.parse_for(&path, registry) {
                if !parsed.package_name.is_empty() {
                    return parsed;
                }
            }
        }

        ParsedRequest::unknown(&path, None)
    }

    fn parse_for(&self, path: &str, registry: Ecosystem) -> Option<ParsedRequest> {
        match registry {
            Ecosystem::Npm => parse_npm(path),
            Ecosystem::Pypi => parse_pypi(path),
            Ecosystem::Maven => parse_maven(path),
            Ecosystem::Nuget => parse_nuget(path),
        }
    }
}

fn npm_request(
    path: &str,
    name: String,
    rest: Option<&str>,
) -> ParsedRequest {
    if let Some(rest) = rest.filter(|r| !r.is_empty()) {
        if let Some(caps) = npm_tarball_re().captures(rest) {
            return ParsedRequest {
                registry: Some(Ecosystem::Npm),
                package_name: name,
                version: Some(caps[2].to_string()),
                is_metadata_request: false,
                is_tarball_request: true,
                raw_path: path.to_string(),
            };
        }
        if rest.starts_with("-/") && rest.ends_with(".tgz") {
            // Best-effort version from the tarball filename.
            let filename = &rest[2..rest.len() - 4];
            if let Some((_, version)) = filename.rsplit_once('-') {
                if !version.is_empty() {
                    return ParsedRequest {
                        registry: Some(Ecosystem::Npm),
                        package_name: name,
                        version: Some(version.to_string()),
                        is_metadata_request: false,
                        is_tarball_request: true,
                        raw_path: path.to_string(),
                    };
                }
            }
        }
        // A version request like /{name}/{version}.
        let version = (!rest.starts_with('-')).then(|| rest.to_string());
        return ParsedRequest {
            registry: Some(Ecosystem::Npm),
            package_name: name,
            version,
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: path.to_string(),
        };
    }

    ParsedRequest {
        registry: Some(Ecosystem::Npm),
        package_name: name,
        version: None,
        is_metadata_request: true,
        is_tarball_request: false,
        raw_path: path.to_string(),
    }
}

fn parse_npm(path: &str) -> Option<ParsedRequest> {
    if let Some(caps) = npm_scoped_re().captures(path) {
        let name = format!("@{}/{}", &caps[1], &caps[2]);
        let rest = caps.get(3).map(|m| m.as_str());
        return Some(npm_request(path, name, rest));
    }

    let caps = npm_unscoped_re().captures(path)?;
    let name = caps[1].to_string();
    // Reserved and service paths are never packages.
    if name == "-" || name == "favicon.ico" || name.starts_with('_') || name.starts_with('.') {
        return None;
    }
    let rest = caps.get(2).map(|m| m.as_str());
    Some(npm_request(path, name, rest))
}

fn parse_pypi(path: &str) -> Option<ParsedRequest> {
    if let Some(caps) = pypi_simple_re().captures(path) {
        return Some(ParsedRequest {
            registry: Some(Ecosystem::Pypi),
            package_name: normalize_pypi_name(&caps[1]),
            version: None,
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: path.to_string(),
        });
    }
    if let Some(caps) = pypi_json_re().captures(path) {
        return Some(ParsedRequest {
            registry: Some(Ecosystem::Pypi),
            package_name: normalize_pypi_name(&caps[1]),
            version: caps.get(2).map(|m| m.as_str().to_string()),
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: path.to_string(),
        });
    }
    for re in [pypi_sdist_re(), pypi_wheel_re()] {
        if let Some(caps) = re.captures(path) {
            return Some(ParsedRequest {
                registry: Some(Ecosystem::Pypi),
                package_name: normalize_pypi_name(&caps[1]),
                version: Some(caps[2].to_string()),
                is_metadata_request: false,
                is_tarball_request: true,
                raw_path: path.to_string(),
            });
        }
    }
    None
}

fn parse_maven(path: &str) -> Option<ParsedRequest> {
    // Artifact download, most specific: the filename must be
    // {artifact}-{version}[-classifier].{ext}.
    if let Some(caps) = maven_artifact_re().captures(path) {
        let group_path = &caps[1];
        let artifact = &caps[2];
        let version = &caps[3];
        let filename = &caps[4];
        let prefix = format!("{artifact}-{version}");
        if filename == prefix || filename.starts_with(&format!("{prefix}-")) {
            return Some(ParsedRequest {
                registry: Some(Ecosystem::Maven),
                package_name: format!("{}:{artifact}", group_path.replace('/', ".")),
                version: Some(version.to_string()),
                is_metadata_request: false,
                is_tarball_request: true,
                raw_path: path.to_string(),
            });
        }
    }

    // Version-level metadata, only when the trailing segment looks like a
    // version; otherwise it is the artifact of a deeper group path.
    if let Some(caps) = maven_version_metadata_re().captures(path) {
        let group_path = &caps[1];
        let artifact = &caps[2];
        let potential_version = &caps[3];
        let looks_like_version = potential_version
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
            || potential_version.starts_with('v')
            || potential_version.contains("-SNAPSHOT");
        if looks_like_version {
            return Some(ParsedRequest {
                registry: Some(Ecosystem::Maven),
                package_name: format!("{}:{artifact}", group_path.replace('/', ".")),
                version: Some(potential_version.to_string()),
                is_metadata_request: true,
                is_tarball_request: false,
                raw_path: path.to_string(),
            });
        }
        return Some(ParsedRequest {
            registry: Some(Ecosystem::Maven),
            package_name: format!(
                "{}.{artifact}:{potential_version}",
                group_path.replace('/', ".")
            ),
            version: None,
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: path.to_string(),
        });
    }

    if let Some(caps) = maven_metadata_re().captures(path) {
        let group_path = &caps[1];
        let artifact = &caps[2];
        return Some(ParsedRequest {
            registry: Some(Ecosystem::Maven),
            package_name: format!("{}:{artifact}", group_path.replace('/', ".")),
            version: None,
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: path.to_string(),
        });
    }

    None
}

fn parse_nuget(path: &str) -> Option<ParsedRequest> {
    if let Some(caps) = nuget_registration_re().captures(path) {
        return Some(ParsedRequest {
            registry: Some(Ecosystem::Nuget),
            package_name: caps[1].to_lowercase(),
            version: caps.get(2).map(|m| m.as_str().to_string()),
            is_metadata_request: true,
            is_tarball_request: false,
            raw_path: path.to_string(),
        });
    }
    if let Some(caps) = nuget_flatcontainer_re().captures(path) {
        let version = caps.get(2).map(|m| m.as_str().to_string());
        let is_tarball = version.is_some() && path.ends_with(".nupkg");
        return Some(ParsedRequest {
            registry: Some(Ecosystem::Nuget),
            package_name: caps[1].to_lowercase(),
            version,
            is_metadata_request: !is_tarball,
            is_tarball_request: is_tarball,
            raw_path: path.to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> ParsedRequest {
        RequestParser::new().parse(path, None)
    }

    #[test]
    fn npm_metadata_paths() {
        let parsed = parse("/lodash");
        assert_eq!(parsed.registry, Some(Ecosystem::Npm));
        assert_eq!(parsed.package_name, "lodash");
        assert!(parsed.is_metadata_request);
        assert!(parsed.version.is_none());

        let parsed = parse("/@babel/core");
        assert_eq!(parsed.package_name, "@babel/core");

        let parsed = parse("/lodash/4.17.21");
        assert_eq!(parsed.version.as_deref(), Some("4.17.21"));
    }

    #[test]
    fn npm_tarball_paths() {
        let parsed = parse("/lodash/-/lodash-4.17.21.tgz");
        assert_eq!(parsed.package_name, "lodash");
        assert_eq!(parsed.version.as_deref(), Some("4.17.21"));
        assert!(parsed.is_tarball_request);
        assert!(!parsed.is_metadata_request);

        let parsed = parse("/@babel/core/-/core-7.23.0.tgz");
        assert_eq!(parsed.package_name, "@babel/core");
        assert_eq!(parsed.version.as_deref(), Some("7.23.0"));
        assert!(parsed.is_tarball_request);
    }

    #[test]
    fn pypi_paths_normalize_names() {
        let parsed = parse("/simple/My_Package/");
        assert_eq!(parsed.registry, Some(Ecosystem::Pypi));
        assert_eq!(parsed.package_name, "my-package");

        let parsed = parse("/pypi/requests/2.31.0/json");
        assert_eq!(parsed.package_name, "requests");
        assert_eq!(parsed.version.as_deref(), Some("2.31.0"));
    }

    #[test]
    fn pypi_artifact_paths() {
        let parsed = parse("/packages/aa/bb/cc/requests-2.31.0.tar.gz");
        assert_eq!(parsed.package_name, "requests");
        assert_eq!(parsed.version.as_deref(), Some("2.31.0"));
        assert!(parsed.is_tarball_request);

        // Wheels split on the last digit-led token, tolerating digits in
        // the (normalized) name.
        let parsed = parse("/packages/aa/bb/cc/charset_normalizer-3.3.2-cp311-cp311-win_amd64.whl");
        assert_eq!(parsed.package_name, "charset-normalizer");
        assert_eq!(parsed.version.as_deref(), Some("3.3.2"));
        assert!(parsed.is_tarball_request);
    }

    #[test]
    fn maven_paths() {
        let parsed = parse("/maven2/com/google/guava/guava/maven-metadata.xml");
        assert_eq!(parsed.registry, Some(Ecosystem::Maven));
        assert_eq!(parsed.package_name, "com.google.guava:guava");
        assert!(parsed.is_metadata_request);

        let parsed = parse("/com/google/guava/guava/33.0.0-jre/guava-33.0.0-jre.jar");
        assert_eq!(parsed.package_name, "com.google.guava:guava");
        assert_eq!(parsed.version.as_deref(), Some("33.0.0-jre"));
        assert!(parsed.is_tarball_request);

        let parsed = parse("/maven2/org/apache/maven/plugins/maven-compiler-plugin/3.11.0/maven-metadata.xml");
        assert_eq!(
            parsed.package_name,
            "org.apache.maven.plugins:maven-compiler-plugin"
        );
        assert_eq!(parsed.version.as_deref(), Some("3.11.0"));
    }

    #[test]
    fn maven_filename_must_match_coordinates() {
        // Filename does not start with artifact-version: not an artifact.
        let parsed = parse("/maven2/com/example/lib/1.0/other-2.0.jar");
        assert_ne!(parsed.registry, Some(Ecosystem::Maven));
    }

    #[test]
    fn nuget_paths() {
        let parsed = parse("/v3/registration5-gz-semver2/Newtonsoft.Json/index.json");
        assert_eq!(parsed.registry, Some(Ecosystem::Nuget));
        assert_eq!(parsed.package_name, "newtonsoft.json");
        assert!(parsed.is_metadata_request);

        let parsed = parse("/v3/registration5-gz-semver2/newtonsoft.json/13.0.3.json");
        assert_eq!(parsed.version.as_deref(), Some("13.0.3"));

        let parsed = parse("/v3-flatcontainer/newtonsoft.json/13.0.3/newtonsoft.json.13.0.3.nupkg");
        assert_eq!(parsed.package_name, "newtonsoft.json");
        assert_eq!(parsed.version.as_deref(), Some("13.0.3"));
        assert!(parsed.is_tarball_request);

        let parsed = parse("/v3-flatcontainer/serilog/index.json");
        assert_eq!(parsed.package_name, "serilog");
        assert!(parsed.is_metadata_request);
    }

    #[test]
    fn health_path_is_not_a_package() {
        let parsed = parse("/_depgate/health");
        assert!(parsed.package_name.is_empty());
        assert_eq!(parsed.registry, None);
    }

    #[test]
    fn hint_constrains_parsing() {
        let parser = RequestParser::new();
        let parsed = parser.parse("/simple/requests/", Some(Ecosystem::Npm));
        // npm parses /simple/requests/ as name "simple" + rest; the hint
        // keeps it in the npm grammar.
        assert_eq!(parsed.registry, Some(Ecosystem::Npm));
        assert_eq!(parsed.package_name, "simple");

        let parsed = parser.parse("/totally/unknown/shape/x.bin", Some(Ecosystem::Pypi));
        assert_eq!(parsed.registry, Some(Ecosystem::Pypi));
        assert!(parsed.package_name.is_empty());
    }

    #[test]
    fn percent_encoded_paths_decode() {
        let parsed = parse("/%40babel/core");
        assert_eq!(parsed.package_name, "@babel/core");
    }
}
