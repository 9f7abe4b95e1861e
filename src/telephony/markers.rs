//! Completion markers written by the dialplan
//!
//! When a call ends, the dialplan drops `<call_id>_call_done` into the answers
//! directory, next to any other per-call artifacts (`<call_id>_answer_1.wav`,
//! ...). The dispatcher only ever checks for the marker's existence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default directory the dialplan writes call artifacts into
pub const DEFAULT_ANSWERS_DIR: &str = "calls_answers";

const DONE_SUFFIX: &str = "_call_done";

/// Source of call completion signals
pub trait CompletionSource: Send + Sync {
    /// Whether the call identified by `call_id` has finished
    fn is_complete(&self, call_id: u64) -> io::Result<bool>;

    /// Removes leftover artifacts of `call_id` from an earlier use of the same id
    ///
    /// Returns how many artifacts were removed. Must be idempotent.
    fn clear_stale(&self, call_id: u64) -> io::Result<usize>;
}

/// Marker files in a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct MarkerDirectory {
    dir: PathBuf,
}

impl MarkerDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory if it does not exist yet
    pub fn ensure_exists(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Path of the marker signalling that `call_id` finished
    pub fn marker_path(&self, call_id: u64) -> PathBuf {
        self.dir.join(format!("{}{}", call_id, DONE_SUFFIX))
    }
}

impl CompletionSource for MarkerDirectory {
    fn is_complete(&self, call_id: u64) -> io::Result<bool> {
        self.marker_path(call_id).try_exists()
    }

    fn clear_stale(&self, call_id: u64) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let prefix = format!("{}_", call_id);
        let mut removed = 0;

        for entry in entries {
            let entry = entry?;
            let matches = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&prefix))
                .unwrap_or(false);
            if !matches || entry.file_type()?.is_dir() {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed stale artifact {}", entry.path().display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(removed)
    }
}
