//! Publishing a single artifact to every distribution it targets.
//!
//! [`ArtifactPublisher::publish`] downloads the artifact once into a fresh
//! per-invocation directory, then hands the file to the [`Publisher`] once
//! per target, all targets concurrently. A failing target does not cancel
//! the others; the artifact only counts as published when all of them
//! succeeded.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{is_excluded, PublishOptions};
use crate::contract::{Artifact, Downloader, PublishRequest, Publisher};

pub struct ArtifactPublisher<'a, D, P> {
    downloader: &'a D,
    publisher: &'a P,
    work_dir: PathBuf,
}

impl<'a, D, P> ArtifactPublisher<'a, D, P>
where
    D: Downloader,
    P: Publisher,
{
    pub fn new(downloader: &'a D, publisher: &'a P, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            publisher,
            work_dir: work_dir.into(),
        }
    }

    /// Download `artifact` and publish it to each of `options.targets`.
    ///
    /// Returns `true` only if the download and every target publish succeeded.
    pub async fn publish(&self, artifact: &Artifact, options: &PublishOptions) -> bool {
        if is_excluded(options) {
            warn!(artifact = %artifact.name, "Refusing to publish artifact without targets");
            return false;
        }

        let scratch = self.work_dir.join(Uuid::new_v4().to_string());
        if let Err(e) = tokio::fs::create_dir_all(&scratch).await {
            error!(artifact = %artifact.name, path = %scratch.display(), error = %e, "Failed to create work directory for {}", artifact.name);
            return false;
        }

        let path = scratch.join(file_name(&artifact.name));
        let published = match self.downloader.download(artifact, &path).await {
            Ok(()) => self.publish_targets(artifact, &path, options).await,
            Err(e) => {
                error!(artifact = %artifact.name, error = %e, "Download failed for {}", artifact.name);
                false
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(path = %scratch.display(), error = %e, "Failed to clean up work directory");
        }
        published
    }

    async fn publish_targets(&self, artifact: &Artifact, path: &Path, options: &PublishOptions) -> bool {
        let requests: Vec<PublishRequest> = options
            .targets
            .iter()
            .map(|target| PublishRequest {
                artifact: artifact.name.clone(),
                path: path.to_path_buf(),
                target: target.clone(),
                pool: options.pool.clone(),
            })
            .collect();

        let outcomes = join_all(requests.iter().map(|request| async move {
            match self.publisher.publish(request).await {
                Ok(output) => {
                    info!(
                        artifact = %request.artifact,
                        target = %request.target,
                        pool = request.pool.as_deref().unwrap_or("default"),
                        "{}",
                        output.diagnostics.trim_end()
                    );
                    true
                }
                Err(e) => {
                    error!(
                        artifact = %request.artifact,
                        target = %request.target,
                        error = %e,
                        "Publishing {} to {} failed",
                        request.artifact,
                        request.target
                    );
                    false
                }
            }
        }))
        .await;

        let all_ok = outcomes.iter().all(|ok| *ok);
        debug!(
            artifact = %artifact.name,
            targets = outcomes.len(),
            failed = outcomes.iter().filter(|ok| !**ok).count(),
            "Finished publishing artifact"
        );
        all_ok
    }
}

/// Keep only the final path component of an asset name.
fn file_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact")
}
