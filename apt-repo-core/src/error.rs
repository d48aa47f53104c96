//! Error types for apt-repo-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or writing configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid asset pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors from reading or persisting the sync state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is not a JSON object of project to release: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by a [`crate::contract::ReleaseSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{0}")]
    Other(String),
}

/// Errors raised while fetching an artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("digest mismatch for {name}: expected {expected}, got {actual}")]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// Errors raised by a single publish invocation against one target.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to launch {program} for target {target}: {source}")]
    Spawn {
        program: String,
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("publish to {target} failed ({status}): {stderr}")]
    Failed {
        target: String,
        status: String,
        stderr: String,
    },

    #[error("publish to {target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },

    #[error("{0}")]
    Other(String),
}

/// Errors that abort a whole synchronisation run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("listing projects failed: {0}")]
    ListProjects(#[source] SourceError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// Convenience constructor for [`DownloadError::Io`].
pub(crate) fn download_io(path: impl Into<PathBuf>, source: std::io::Error) -> DownloadError {
    DownloadError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`StateError::Io`].
pub(crate) fn state_io(path: impl Into<PathBuf>, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.into(),
        source,
    }
}
