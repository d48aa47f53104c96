//! # contract: capability traits between the engine and the outside world
//!
//! The synchronisation engine never talks to GitHub, the network or the
//! repository tool directly. It goes through three traits:
//!
//! - [`ReleaseSource`]: enumerates projects and reports their latest release.
//! - [`Downloader`]: fetches release assets to disk or into memory.
//! - [`Publisher`]: adds one downloaded package to one target distribution.
//!
//! Each trait is annotated for `mockall`, so tests can script responses and
//! count calls. Mocks are exported under the `test-export-mocks` feature
//! (on by default) for use from integration tests in other crates.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use mockall::{automock, predicate::*};

use crate::error::{DownloadError, PublishError, SourceError};

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name; doubles as the configuration match key.
    pub name: String,
    pub download_url: String,
    /// Content digest as published by the host, e.g. `sha256:ab12...`.
    #[serde(default)]
    pub digest: Option<String>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
            digest: None,
        }
    }
}

/// The latest release of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRelease {
    pub project: String,
    /// Opaque release identity compared against the stored state.
    pub tag: String,
    pub assets: Vec<Artifact>,
}

/// One publish invocation: a downloaded file headed for one distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub artifact: String,
    pub path: PathBuf,
    pub target: String,
    pub pool: Option<String>,
}

/// What the repository tool reported on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutput {
    pub diagnostics: String,
}

/// Source of projects and their releases (a GitHub organisation in production).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Names of every project that may carry releases.
    async fn list_projects(&self) -> Result<Vec<String>, SourceError>;

    /// Latest release of `project`, or `None` when the project has none yet.
    async fn latest_release(&self, project: &str) -> Result<Option<ProjectRelease>, SourceError>;
}

/// Fetches release assets.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stream `artifact` into the file at `dest`. The parent directory exists.
    async fn download(&self, artifact: &Artifact, dest: &Path) -> Result<(), DownloadError>;

    /// Read a small text asset, such as a project config, into memory.
    async fn fetch_text(&self, artifact: &Artifact) -> Result<String, DownloadError>;
}

/// Adds a package file to a distribution of the managed repository.
///
/// Implementations must be idempotent from the repository's point of view:
/// a release that partially failed is republished in full on the next run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishOutput, PublishError>;
}
