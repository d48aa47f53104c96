//! High-level pipeline: mirrors the latest release of every project.
//!
//! For each project reported by the [`ReleaseSource`], the orchestrator:
//!   - fetches the latest release and skips projects without one;
//!   - skips releases already recorded in the [`SyncState`];
//!   - reads the project config shipped with the release, if any;
//!   - resolves publish options per candidate artifact and publishes the
//!     non-excluded ones through an [`ArtifactPublisher`];
//!   - commits the release tag only if every publish succeeded.
//!
//! Projects run concurrently (bounded by [`SynchroniseConfig::concurrency`]),
//! artifacts of one project and targets of one artifact run concurrently
//! without bound. Failures stay local to their project; the run goes on and
//! the project is retried next time because its tag was never committed.
//!
//! # Navigation
//! - Main entrypoint: [`run`] (load state, synchronise, persist once)
//! - In-memory core: [`synchronise`]
//! - Output: [`SynchroniseReport`]

use std::path::PathBuf;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::config::{is_excluded, resolve, ConfigDocument};
use crate::contract::{Artifact, Downloader, ProjectRelease, Publisher, ReleaseSource};
use crate::error::{ConfigError, SyncError};
use crate::publish::ArtifactPublisher;
use crate::state::{StateStore, SyncState};

/// Default pattern selecting which release assets are packages.
pub const DEFAULT_ASSET_PATTERN: &str = r"\.deb$";
/// Default name of the per-project config asset.
pub const DEFAULT_PROJECT_CONFIG: &str = "pkg.conf";
/// Default number of projects processed at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct SynchroniseConfig {
    pub global: ConfigDocument,
    /// Scratch space for downloads; each publish gets its own subdirectory.
    pub work_dir: PathBuf,
    pub asset_pattern: Regex,
    pub project_config_name: String,
    pub concurrency: usize,
}

impl SynchroniseConfig {
    pub fn new(global: ConfigDocument, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            global,
            work_dir: work_dir.into(),
            asset_pattern: default_asset_pattern(),
            project_config_name: DEFAULT_PROJECT_CONFIG.to_owned(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_asset_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.asset_pattern = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(self)
    }

    pub fn with_project_config_name(mut self, name: impl Into<String>) -> Self {
        self.project_config_name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

fn default_asset_pattern() -> Regex {
    Regex::new(DEFAULT_ASSET_PATTERN).expect("default asset pattern is a valid regex")
}

/// Result of a whole run, one entry per project.
#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub projects: Vec<ProjectReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReport {
    pub project: String,
    pub release: Option<String>,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectStatus {
    /// The project has not published any release.
    NoRelease,
    /// The latest release was mirrored by an earlier run.
    UpToDate,
    /// Every non-excluded artifact was published; the tag was committed.
    Published {
        published: Vec<String>,
        excluded: Vec<String>,
    },
    /// At least one artifact failed; the tag was left untouched.
    Failed {
        failed: Vec<String>,
        excluded: Vec<String>,
    },
    /// The release could not be fetched.
    Errored(String),
}

impl SynchroniseReport {
    pub fn project(&self, name: &str) -> Option<&ProjectReport> {
        self.projects.iter().find(|p| p.project == name)
    }

    pub fn count(&self, pred: impl Fn(&ProjectStatus) -> bool) -> usize {
        self.projects.iter().filter(|p| pred(&p.status)).count()
    }
}

/// Load the state, synchronise every project and persist the state once.
pub async fn run<S, D, P>(
    config: &SynchroniseConfig,
    source: &S,
    downloader: &D,
    publisher: &P,
    store: &StateStore,
) -> Result<SynchroniseReport, SyncError>
where
    S: ReleaseSource,
    D: Downloader,
    P: Publisher,
{
    let state = store.load()?;
    let report = synchronise(config, source, downloader, publisher, &state).await?;
    store.persist(&state)?;
    Ok(report)
}

/// Mirror every project's latest release, committing progress into `state`.
pub async fn synchronise<S, D, P>(
    config: &SynchroniseConfig,
    source: &S,
    downloader: &D,
    publisher: &P,
    state: &SyncState,
) -> Result<SynchroniseReport, SyncError>
where
    S: ReleaseSource,
    D: Downloader,
    P: Publisher,
{
    info!("[SYNC] Starting synchronisation");
    let projects = source.list_projects().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Failed to list projects");
        SyncError::ListProjects(e)
    })?;
    info!(projects = projects.len(), "[SYNC] Listed projects");

    let artifact_publisher = ArtifactPublisher::new(downloader, publisher, &config.work_dir);
    let reports: Vec<ProjectReport> = stream::iter(projects)
        .map(|project| sync_project(config, source, downloader, &artifact_publisher, state, project))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let report = SynchroniseReport { projects: reports };
    info!(
        projects = report.projects.len(),
        published = report.count(|s| matches!(s, ProjectStatus::Published { .. })),
        failed = report.count(|s| matches!(s, ProjectStatus::Failed { .. } | ProjectStatus::Errored(_))),
        up_to_date = report.count(|s| *s == ProjectStatus::UpToDate),
        "[SYNC] Synchronisation finished"
    );
    Ok(report)
}

async fn sync_project<S, D, P>(
    config: &SynchroniseConfig,
    source: &S,
    downloader: &D,
    artifact_publisher: &ArtifactPublisher<'_, D, P>,
    state: &SyncState,
    project: String,
) -> ProjectReport
where
    S: ReleaseSource,
    D: Downloader,
    P: Publisher,
{
    let release = match source.latest_release(&project).await {
        Ok(Some(release)) => release,
        Ok(None) => {
            info!(project = %project, "No release for {project}, skipping");
            return ProjectReport {
                project,
                release: None,
                status: ProjectStatus::NoRelease,
            };
        }
        Err(e) => {
            error!(project = %project, error = %e, "Failed to fetch latest release of {project}");
            return ProjectReport {
                project,
                release: None,
                status: ProjectStatus::Errored(e.to_string()),
            };
        }
    };

    if !state.should_process(&project, &release.tag) {
        debug!(project = %project, tag = %release.tag, "Already mirrored");
        return ProjectReport {
            project,
            release: Some(release.tag),
            status: ProjectStatus::UpToDate,
        };
    }

    info!(project = %project, tag = %release.tag, "Mirroring {project} {}", release.tag);
    let project_config = fetch_project_config(config, downloader, &release).await;

    let mut excluded = Vec::new();
    let mut selected = Vec::new();
    for artifact in candidate_artifacts(config, &release) {
        let options = resolve(&artifact.name, &project_config, &config.global);
        if is_excluded(&options) {
            debug!(project = %project, artifact = %artifact.name, "Artifact excluded by config");
            excluded.push(artifact.name.clone());
        } else {
            selected.push((artifact, options));
        }
    }

    let outcomes = join_all(selected.iter().map(|(artifact, options)| async move {
        (
            artifact.name.clone(),
            artifact_publisher.publish(artifact, options).await,
        )
    }))
    .await;

    let (published, failed): (Vec<_>, Vec<_>) = outcomes.into_iter().partition(|(_, ok)| *ok);
    let published: Vec<String> = published.into_iter().map(|(name, _)| name).collect();
    let failed: Vec<String> = failed.into_iter().map(|(name, _)| name).collect();

    let status = if failed.is_empty() {
        state.commit(&project, &release.tag);
        info!(project = %project, tag = %release.tag, artifacts = published.len(), "Mirrored {project} {}", release.tag);
        ProjectStatus::Published { published, excluded }
    } else {
        warn!(project = %project, tag = %release.tag, failed = ?failed, "Not all artifacts of {project} published, will retry next run");
        ProjectStatus::Failed { failed, excluded }
    };

    ProjectReport {
        project,
        release: Some(release.tag),
        status,
    }
}

/// The project config shipped with `release`, or an empty document.
async fn fetch_project_config<D: Downloader>(
    config: &SynchroniseConfig,
    downloader: &D,
    release: &ProjectRelease,
) -> ConfigDocument {
    let Some(asset) = release
        .assets
        .iter()
        .find(|a| a.name == config.project_config_name)
    else {
        return ConfigDocument::new();
    };
    match downloader.fetch_text(asset).await {
        Ok(text) => ConfigDocument::parse_project(&release.project, &text),
        Err(e) => {
            warn!(project = %release.project, error = %e, "Could not fetch project config, using global config");
            ConfigDocument::new()
        }
    }
}

/// Release assets the run would consider as packages.
pub fn candidate_artifacts<'r>(config: &SynchroniseConfig, release: &'r ProjectRelease) -> Vec<&'r Artifact> {
    release
        .assets
        .iter()
        .filter(|a| config.asset_pattern.is_match(&a.name))
        .collect()
}
