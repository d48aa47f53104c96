/// `load_config` module: prepares the local environment a run depends on.
///
/// # Responsibilities
/// - Load the operator's global publish config, or write an example one on
///   first use so the operator can edit it
/// - Create the scratch folder downloads are written into
///
/// # Errors
/// Errors use `anyhow::Error` with the offending path attached, and are
/// mapped to exit statuses at the CLI boundary.
use anyhow::{Context, Result};
use apt_repo_core::config::ConfigDocument;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of loading the global config.
#[derive(Debug)]
pub enum GlobalConfig {
    Loaded(ConfigDocument),
    /// No config existed; an example was written to this path.
    Bootstrapped(PathBuf),
}

/// Load the global config at `path`, writing [`ConfigDocument::example`]
/// there if the file is missing or empty.
pub fn load_global_config<P: AsRef<Path>>(path: P) -> Result<GlobalConfig> {
    let path = path.as_ref();
    info!(config_path = ?path, "Loading global configuration");

    match ConfigDocument::read(path)
        .with_context(|| format!("Failed to load global config {}", path.display()))?
    {
        Some(doc) => {
            if doc.is_empty() {
                warn!(config_path = ?path, "Global config has no entries, every artifact will be excluded");
            }
            info!(config_path = ?path, entries = doc.len(), "Global config loaded");
            Ok(GlobalConfig::Loaded(doc))
        }
        None => {
            ConfigDocument::example()
                .write(path)
                .with_context(|| format!("Failed to write example config {}", path.display()))?;
            info!(config_path = ?path, "Wrote example global config");
            Ok(GlobalConfig::Bootstrapped(path.to_path_buf()))
        }
    }
}

/// Scratch folder used when none is given on the command line.
pub fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("apt-repo")
}

/// Create the scratch folder if needed.
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output folder {}", dir.display()))?;
    info!(output_dir = %dir.display(), "Output folder ready");
    Ok(())
}
