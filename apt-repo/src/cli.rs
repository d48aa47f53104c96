///
/// This module implements the CLI surface of apt-repo: argument model,
/// exit statuses and the async entrypoint wiring GitHub, freight and the
/// synchronisation engine together.
///
/// All mirroring logic (config resolution, state, publishing) lives in the
/// [`apt-repo-core`] crate; this module only builds the collaborators and
/// maps outcomes to process exit codes.
///
/// ## Exit statuses
/// Per-project failures never change the exit code: they are logged and
/// retried on the next run. Only setup problems do, see [`ExitStatus`].
///
/// [`apt-repo-core`]: ../../apt-repo-core/
use crate::freight::{FreightPublisher, DEFAULT_TIMEOUT};
use crate::github::{GitHubClient, DEFAULT_API_URL};
use crate::load_config::{default_output_dir, load_global_config, prepare_output_dir, GlobalConfig};
use apt_repo_core::download::HttpDownloader;
use apt_repo_core::state::StateStore;
use apt_repo_core::synchronise::{
    self, ProjectStatus, SynchroniseConfig, SynchroniseReport, DEFAULT_ASSET_PATTERN,
    DEFAULT_CONCURRENCY, DEFAULT_PROJECT_CONFIG,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Mirror .deb release assets of a GitHub organisation into a freight APT repository.
#[derive(Parser, Debug)]
#[clap(
    name = "apt-repo",
    version,
    about = "Mirror .deb release assets of a GitHub organisation into a freight APT repository"
)]
pub struct Cli {
    /// GitHub access token
    pub token: String,

    /// Organisation whose repositories are mirrored
    pub org: String,

    /// Folder downloads are written to [default: <system temp>/apt-repo]
    pub output_dir: Option<PathBuf>,

    /// Global publish config; an example is written if it does not exist
    #[clap(long, default_value = ".apt-repo.json")]
    pub config: PathBuf,

    /// File recording the last mirrored release of each project
    #[clap(long, default_value = "pkgs.json")]
    pub state: PathBuf,

    /// GitHub API base URL
    #[clap(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// freight executable
    #[clap(long, default_value = "freight")]
    pub freight: PathBuf,

    /// freight manager prefix of every distribution
    #[clap(long, default_value = "apt")]
    pub manager: String,

    /// Regex selecting which release assets are packages
    #[clap(long, default_value = DEFAULT_ASSET_PATTERN)]
    pub asset_pattern: String,

    /// Name of the per-project config asset
    #[clap(long, default_value = DEFAULT_PROJECT_CONFIG)]
    pub project_config: String,

    /// Projects processed at once
    #[clap(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Seconds before a freight invocation is killed
    #[clap(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub publish_timeout: u64,
}

/// Process exit statuses. The non-zero codes match the ones earlier
/// releases returned as -1, -2 and -3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The run completed, possibly with failed projects.
    Success,
    /// Unexpected fatal error, e.g. malformed config or state file.
    Fatal,
    /// No global config existed; an example was written.
    ConfigBootstrapped,
    /// The output folder could not be created.
    FolderSetupFailed,
    /// Wrong number of arguments.
    Usage,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Fatal => 1,
            ExitStatus::ConfigBootstrapped => 253,
            ExitStatus::FolderSetupFailed => 254,
            ExitStatus::Usage => 255,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> ExitStatus {
    tracing::info!(org = %cli.org, "apt-repo starting");

    let output_dir = cli.output_dir.clone().unwrap_or_else(default_output_dir);
    if let Err(e) = prepare_output_dir(&output_dir) {
        tracing::error!(error = %format!("{e:#}"), "Failed to set up output folder");
        return ExitStatus::FolderSetupFailed;
    }

    let global = match load_global_config(&cli.config) {
        Ok(GlobalConfig::Loaded(doc)) => doc,
        Ok(GlobalConfig::Bootstrapped(path)) => {
            tracing::warn!(
                config_path = %path.display(),
                "Example config file has been generated. Please adapt it to your environment and try again."
            );
            return ExitStatus::ConfigBootstrapped;
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Could not load global config");
            return ExitStatus::Fatal;
        }
    };

    match sync(&cli, global, output_dir).await {
        Ok(report) => {
            log_report(&report);
            ExitStatus::Success
        }
        Err(e) => {
            tracing::error!(command = "sync", error = %format!("{e:#}"), "Synchronisation failed");
            ExitStatus::Fatal
        }
    }
}

async fn sync(
    cli: &Cli,
    global: apt_repo_core::config::ConfigDocument,
    output_dir: PathBuf,
) -> anyhow::Result<SynchroniseReport> {
    let config = SynchroniseConfig::new(global, output_dir)
        .with_asset_pattern(&cli.asset_pattern)?
        .with_project_config_name(cli.project_config.clone())
        .with_concurrency(cli.concurrency);

    let source = GitHubClient::new(&cli.api_url, &cli.token, &cli.org)?;
    let downloader = HttpDownloader::new(source.http().clone());
    let publisher = FreightPublisher::new(cli.freight.clone(), cli.manager.clone())
        .with_timeout(Duration::from_secs(cli.publish_timeout));
    let store = StateStore::new(cli.state.clone());

    let report = synchronise::run(&config, &source, &downloader, &publisher, &store).await?;
    Ok(report)
}

fn log_report(report: &SynchroniseReport) {
    for project in &report.projects {
        let release = project.release.as_deref().unwrap_or("-");
        match &project.status {
            ProjectStatus::Published {
                published,
                excluded,
            } => tracing::info!(
                project = %project.project,
                release,
                published = published.len(),
                excluded = excluded.len(),
                "Published"
            ),
            ProjectStatus::Failed { failed, .. } => tracing::error!(
                project = %project.project,
                release,
                failed = ?failed,
                "Failed, will retry next run"
            ),
            ProjectStatus::Errored(message) => tracing::error!(
                project = %project.project,
                error = %message,
                "Could not read release"
            ),
            ProjectStatus::UpToDate | ProjectStatus::NoRelease => tracing::debug!(
                project = %project.project,
                release,
                status = ?project.status,
                "Nothing to do"
            ),
        }
    }
    tracing::info!(command = "sync", projects = report.projects.len(), "Synchronisation complete");
}
