//! Sync state: which release of each project has been fully mirrored.
//!
//! The state file is a JSON object mapping project name to release tag. It
//! is read once when a run starts and written once when it ends; in between,
//! project tasks record progress through [`SyncState::commit`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{state_io, StateError};

/// In-memory sync state shared by concurrent project tasks.
///
/// The lock is only ever held for a single read or single-key upsert.
#[derive(Debug, Default)]
pub struct SyncState {
    entries: Mutex<BTreeMap<String, String>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// True when `project` has never been mirrored or was mirrored at a different tag.
    pub fn should_process(&self, project: &str, tag: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(project).map_or(true, |stored| stored != tag)
    }

    /// Record `tag` as the mirrored release of `project`.
    pub fn commit(&self, project: &str, tag: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(project.to_owned(), tag.to_owned());
    }

    pub fn get(&self, project: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(project).cloned()
    }

    /// Copy of every entry, sorted by project name.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Location of the durable state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state. A missing or blank file is an empty state.
    pub fn load(&self) -> Result<SyncState, StateError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No state file yet, starting empty");
                return Ok(SyncState::new());
            }
            Err(e) => return Err(state_io(&self.path, e)),
        };
        if text.trim().is_empty() {
            return Ok(SyncState::new());
        }
        let entries: BTreeMap<String, String> =
            serde_json::from_str(&text).map_err(|source| StateError::Parse {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), projects = entries.len(), "Loaded sync state");
        Ok(SyncState::from_entries(entries))
    }

    /// Write the state atomically: a temp file in the same directory is
    /// renamed over the target.
    pub fn persist(&self, state: &SyncState) -> Result<(), StateError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| state_io(&dir, e))?;

        let entries = state.snapshot();
        let json = serde_json::to_string_pretty(&entries)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| state_io(&dir, e))?;
        let tmp_path = tmp.path().to_path_buf();
        writeln!(tmp, "{json}").map_err(|e| state_io(&tmp_path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| state_io(&tmp_path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| state_io(&self.path, e.error))?;

        info!(path = %self.path.display(), projects = entries.len(), "Persisted sync state");
        Ok(())
    }
}
