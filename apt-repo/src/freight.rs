//! Publisher backed by the `freight` repository tool.
//!
//! Each publish runs `freight add -e <file> <manager>/<target>[/<pool>]`.
//! Exit code 0 is success; stderr is returned as diagnostics either way.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use apt_repo_core::contract::{PublishOutput, PublishRequest, Publisher};
use apt_repo_core::error::PublishError;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct FreightPublisher {
    program: PathBuf,
    /// Arguments placed before `add`, e.g. when freight runs through a wrapper.
    prefix_args: Vec<String>,
    manager: String,
    add_args: Vec<String>,
    timeout: Duration,
}

impl FreightPublisher {
    pub fn new(program: impl Into<PathBuf>, manager: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            manager: manager.into(),
            add_args: vec!["-e".to_owned()],
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<manager>/<target>` or `<manager>/<target>/<pool>`.
    pub fn destination(&self, target: &str, pool: Option<&str>) -> String {
        match pool {
            Some(pool) => format!("{}/{}/{}", self.manager, target, pool),
            None => format!("{}/{}", self.manager, target),
        }
    }

    fn command(&self, request: &PublishRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg("add")
            .args(&self.add_args)
            .arg(&request.path)
            .arg(self.destination(&request.target, request.pool.as_deref()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FreightPublisher {
    fn default() -> Self {
        Self::new("freight", "apt")
    }
}

#[async_trait]
impl Publisher for FreightPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishOutput, PublishError> {
        let destination = self.destination(&request.target, request.pool.as_deref());
        tracing::debug!(
            program = %self.program.display(),
            artifact = %request.artifact,
            destination = %destination,
            "Running freight add"
        );

        let output = match timeout(self.timeout, self.command(request).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(PublishError::Spawn {
                    program: self.program.display().to_string(),
                    target: request.target.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(artifact = %request.artifact, destination = %destination, "freight add timed out, killed");
                return Err(PublishError::Timeout {
                    target: request.target.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_owned();
        if output.status.success() {
            Ok(PublishOutput {
                diagnostics: stderr,
            })
        } else {
            Err(PublishError::Failed {
                target: request.target.clone(),
                status: output.status.to_string(),
                stderr,
            })
        }
    }
}
