//! Publish configuration and the layered lookup that resolves it per artifact.
//!
//! Two [`ConfigDocument`]s take part in every lookup: the project config
//! shipped as a release asset, and the operator's global config. Keys are
//! artifact file names, plus the wildcard [`WILDCARD`]. The first matching
//! entry in [`LOOKUP_ORDER`] wins as a whole; fields are never merged.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Reserved key matching any artifact not listed by name.
pub const WILDCARD: &str = "*";

/// Where and how one artifact is published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    /// Distributions to publish into. Empty means the artifact is excluded.
    #[serde(default)]
    pub targets: BTreeSet<String>,
    /// Placement label within each target; `None` uses the default.
    #[serde(default)]
    pub pool: Option<String>,
}

impl PublishOptions {
    pub fn new<I, S>(targets: I, pool: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            pool: pool.map(str::to_owned),
        }
    }

    /// An explicitly empty target list.
    pub fn excluded() -> Self {
        Self::default()
    }
}

/// Mapping from match key to publish options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument {
    entries: BTreeMap<String, PublishOptions>,
}

/// The config format written by the first releases of apt-repo: one list
/// of distributions applied to every package.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyConfig {
    #[serde(rename = "Releases")]
    releases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigCompat {
    Legacy(LegacyConfig),
    Current(ConfigDocument),
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful in tests and for the bootstrap example.
    pub fn with(mut self, key: impl Into<String>, options: PublishOptions) -> Self {
        self.entries.insert(key.into(), options);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PublishOptions> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The document written when no global config exists yet.
    pub fn example() -> Self {
        Self::new().with(WILDCARD, PublishOptions::new(["stable"], None))
    }

    /// Parse a document, accepting the legacy `{"Releases": [...]}` form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<ConfigCompat>(text) {
            Ok(ConfigCompat::Current(doc)) => Ok(doc),
            Ok(ConfigCompat::Legacy(legacy)) => Ok(Self::new().with(
                WILDCARD,
                PublishOptions::new(legacy.releases, None),
            )),
            // Re-parse strictly so the error points at the real problem
            // instead of serde's untagged "did not match any variant".
            Err(_) => serde_json::from_str::<ConfigDocument>(text),
        }
    }

    /// Parse a project config fetched from a release. Anything unreadable
    /// degrades to an empty document so the global config applies.
    pub fn parse_project(project: &str, text: &str) -> Self {
        match Self::from_json(text) {
            Ok(doc) => {
                debug!(project, entries = doc.len(), "Parsed project config");
                doc
            }
            Err(e) => {
                warn!(project, error = %e, "Malformed project config, falling back to global config");
                Self::new()
            }
        }
    }

    /// Read a document from disk. `Ok(None)` means the file is missing or blank.
    pub fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        Self::from_json(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write the document as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io)?;
        }
        std::fs::write(path, json + "\n").map_err(io)
    }
}

/// Which document a lookup step reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Project,
    Global,
}

/// Which key a lookup step tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKey {
    Exact,
    Wildcard,
}

/// Lookup steps in priority order.
pub const LOOKUP_ORDER: [(ConfigSource, MatchKey); 4] = [
    (ConfigSource::Project, MatchKey::Exact),
    (ConfigSource::Global, MatchKey::Exact),
    (ConfigSource::Project, MatchKey::Wildcard),
    (ConfigSource::Global, MatchKey::Wildcard),
];

/// Outcome of a layered lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        source: ConfigSource,
        key: MatchKey,
        options: PublishOptions,
    },
    NotFound,
}

impl Resolution {
    /// The resolved options; a miss yields empty options.
    pub fn into_options(self) -> PublishOptions {
        match self {
            Resolution::Found { options, .. } => options,
            Resolution::NotFound => PublishOptions::default(),
        }
    }
}

/// Walk [`LOOKUP_ORDER`] and return the first entry present.
pub fn lookup(artifact: &str, project: &ConfigDocument, global: &ConfigDocument) -> Resolution {
    for (source, key) in LOOKUP_ORDER {
        let doc = match source {
            ConfigSource::Project => project,
            ConfigSource::Global => global,
        };
        let name = match key {
            MatchKey::Exact => artifact,
            MatchKey::Wildcard => WILDCARD,
        };
        if let Some(options) = doc.get(name) {
            return Resolution::Found {
                source,
                key,
                options: options.clone(),
            };
        }
    }
    Resolution::NotFound
}

/// Resolve the publish options for `artifact`.
pub fn resolve(artifact: &str, project: &ConfigDocument, global: &ConfigDocument) -> PublishOptions {
    lookup(artifact, project, global).into_options()
}

/// True when the options publish nowhere. An explicit empty list and a
/// lookup miss are treated the same.
pub fn is_excluded(options: &PublishOptions) -> bool {
    options.targets.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_wildcard() -> ConfigDocument {
        ConfigDocument::new().with(WILDCARD, PublishOptions::new(["stable"], None))
    }

    #[test]
    fn project_exact_match_beats_global_wildcard() {
        let project =
            ConfigDocument::new().with("foo.deb", PublishOptions::new(["testing"], Some("main")));
        let resolved = resolve("foo.deb", &project, &global_wildcard());
        assert_eq!(resolved, PublishOptions::new(["testing"], Some("main")));
    }

    #[test]
    fn global_exact_match_beats_project_wildcard() {
        let project = ConfigDocument::new().with(WILDCARD, PublishOptions::new(["nightly"], None));
        let global = global_wildcard().with("foo.deb", PublishOptions::new(["lts"], None));
        let resolution = lookup("foo.deb", &project, &global);
        assert_eq!(
            resolution,
            Resolution::Found {
                source: ConfigSource::Global,
                key: MatchKey::Exact,
                options: PublishOptions::new(["lts"], None),
            }
        );
    }

    #[test]
    fn project_wildcard_beats_global_wildcard() {
        let project = ConfigDocument::new().with(WILDCARD, PublishOptions::new(["nightly"], None));
        let resolved = resolve("bar.deb", &project, &global_wildcard());
        assert_eq!(resolved.targets.into_iter().collect::<Vec<_>>(), ["nightly"]);
    }

    #[test]
    fn falls_back_to_global_wildcard() {
        let resolution = lookup("bar.deb", &ConfigDocument::new(), &global_wildcard());
        assert!(matches!(
            resolution,
            Resolution::Found {
                source: ConfigSource::Global,
                key: MatchKey::Wildcard,
                ..
            }
        ));
    }

    #[test]
    fn fields_are_not_merged_across_documents() {
        let project = ConfigDocument::new().with("foo.deb", PublishOptions::new(["testing"], None));
        let global =
            ConfigDocument::new().with("foo.deb", PublishOptions::new(["stable"], Some("contrib")));
        let resolved = resolve("foo.deb", &project, &global);
        assert_eq!(resolved.pool, None);
    }

    #[test]
    fn explicit_empty_targets_stop_the_lookup() {
        let project = ConfigDocument::new().with("foo.deb", PublishOptions::excluded());
        let resolved = resolve("foo.deb", &project, &global_wildcard());
        assert!(is_excluded(&resolved));
    }

    #[test]
    fn no_match_anywhere_is_excluded() {
        let resolution = lookup("foo.deb", &ConfigDocument::new(), &ConfigDocument::new());
        assert_eq!(resolution, Resolution::NotFound);
        assert!(is_excluded(&resolution.into_options()));
    }

    #[test]
    fn parses_missing_fields_as_defaults() {
        let doc = ConfigDocument::from_json(r#"{"foo.deb": {}, "*": {"targets": ["a", "b"]}}"#)
            .unwrap();
        assert!(is_excluded(doc.get("foo.deb").unwrap()));
        assert_eq!(doc.get(WILDCARD).unwrap().targets.len(), 2);
        assert_eq!(doc.get(WILDCARD).unwrap().pool, None);
    }

    #[test]
    fn parses_legacy_releases_list_as_wildcard() {
        let doc = ConfigDocument::from_json(r#"{"Releases": ["stable", "testing"]}"#).unwrap();
        assert_eq!(
            doc.get(WILDCARD),
            Some(&PublishOptions::new(["stable", "testing"], None))
        );
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn malformed_project_config_becomes_empty() {
        let doc = ConfigDocument::parse_project("widget", "{ not json");
        assert!(doc.is_empty());
        let doc = ConfigDocument::parse_project("widget", r#"{"foo.deb": {"targets": 3}}"#);
        assert!(doc.is_empty());
    }

    #[test]
    fn read_missing_or_blank_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.json");
        assert!(ConfigDocument::read(&path).unwrap().is_none());
        std::fs::write(&path, "  \n").unwrap();
        assert!(ConfigDocument::read(&path).unwrap().is_none());
    }

    #[test]
    fn example_survives_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".apt-repo.json");
        ConfigDocument::example().write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"*\""));
        assert_eq!(
            ConfigDocument::read(&path).unwrap(),
            Some(ConfigDocument::example())
        );
    }

    #[test]
    fn read_rejects_malformed_global_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            ConfigDocument::read(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
