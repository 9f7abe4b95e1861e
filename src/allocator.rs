//! Durable, cross-process call-id allocation
//!
//! The allocator owns a single text file holding the last issued call-id as a
//! newline-terminated decimal (`"42\n"`). Every operation runs under an
//! advisory `flock` taken on a sidecar `<store>.lock` file, so independent
//! processes sharing the same store never hand out the same id.
//!
//! The value file is never rewritten in place. A new value is written to a
//! temporary file in the same directory, synced, and renamed over the store,
//! which means a crash at any point leaves either the old or the new value on
//! disk. The lock lives on the sidecar because a rename replaces the store's
//! inode, and a lock held on a replaced inode would no longer exclude anyone.
//!
//! # Example
//!
//! ```no_run
//! use outdial::allocator::CallIdAllocator;
//!
//! # fn example() -> Result<(), outdial::allocator::AllocatorError> {
//! let allocator = CallIdAllocator::new("data/call_id_track");
//! let first = allocator.allocate()?;
//! let second = allocator.allocate()?;
//! assert_eq!(second, first + 1);
//! assert_eq!(allocator.peek()?, second);
//! # Ok(())
//! # }
//! ```

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Default location of the call-id store, relative to the working directory
pub const DEFAULT_STORE_PATH: &str = "data/call_id_track";

const LOCK_SUFFIX: &str = ".lock";

/// Mode of a store created from scratch; rewrites keep the current mode
#[cfg(unix)]
const NEW_STORE_MODE: u32 = 0o644;

/// Errors that can occur while reading or updating the call-id store
#[derive(Debug, Error)]
pub enum AllocatorError {
    /// The store holds something other than a non-negative decimal integer
    #[error("Corrupted call-id store {path}: {content:?} is not a non-negative integer")]
    CorruptedState { path: PathBuf, content: String },

    /// A caller supplied a value the store cannot hold
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The counter reached `u64::MAX`
    #[error("Call-id space exhausted in {0}")]
    Exhausted(PathBuf),

    /// Filesystem failure while locking, reading or writing the store
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AllocatorError {
    fn io(path: &Path, source: io::Error) -> Self {
        AllocatorError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Holds an advisory lock for as long as it lives
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well; this just does it eagerly.
        let _ = FileExt::unlock(&self.file);
    }
}

/// Monotonic call-id generator backed by a text file
///
/// Cloning is cheap: the allocator only carries paths, all state lives on disk.
#[derive(Debug, Clone)]
pub struct CallIdAllocator {
    path: PathBuf,
    lock_path: PathBuf,
}

impl CallIdAllocator {
    /// Creates an allocator for the store at `path`
    ///
    /// Nothing is touched on disk until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = OsString::from(path.as_os_str());
        lock_name.push(LOCK_SUFFIX);

        Self {
            path,
            lock_path: PathBuf::from(lock_name),
        }
    }

    /// Path of the value file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sidecar lock file
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Issues the next call-id
    ///
    /// Blocks until the exclusive lock is available, then reads the current
    /// value (an absent or empty store counts as 0), persists `current + 1`
    /// and returns it.
    ///
    /// # Errors
    ///
    /// - `CorruptedState` if the store does not hold a non-negative integer
    /// - `Exhausted` if the counter is already at `u64::MAX`
    /// - `Io` on any filesystem failure
    pub fn allocate(&self) -> Result<u64, AllocatorError> {
        let _lock = self.lock(LockMode::Exclusive)?;

        let current = self.read_value()?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| AllocatorError::Exhausted(self.path.clone()))?;
        self.write_value(next)?;

        debug!(call_id = next, store = %self.path.display(), "Allocated call-id");
        Ok(next)
    }

    /// Returns the last issued call-id (0 if none yet) without changing it
    pub fn peek(&self) -> Result<u64, AllocatorError> {
        let _lock = self.lock(LockMode::Shared)?;
        self.read_value()
    }

    /// Overwrites the stored value
    ///
    /// The existing content must still be valid: a corrupted store is never
    /// papered over, it has to be inspected and repaired by hand.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `value` is negative; the store is left untouched
    /// - `CorruptedState` if the current content is unparsable
    /// - `Io` on any filesystem failure
    pub fn reset(&self, value: i64) -> Result<(), AllocatorError> {
        let value = u64::try_from(value).map_err(|_| {
            AllocatorError::InvalidArgument(format!(
                "reset value must be >= 0, got {}",
                value
            ))
        })?;

        let _lock = self.lock(LockMode::Exclusive)?;
        let previous = self.read_value()?;
        self.write_value(value)?;

        info!(
            previous,
            value,
            store = %self.path.display(),
            "Reset call-id store"
        );
        Ok(())
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock(&self, mode: LockMode) -> Result<StoreLock, AllocatorError> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| AllocatorError::io(&dir, e))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| AllocatorError::io(&self.lock_path, e))?;

        match mode {
            LockMode::Shared => file.lock_shared(),
            LockMode::Exclusive => file.lock_exclusive(),
        }
        .map_err(|e| AllocatorError::io(&self.lock_path, e))?;

        Ok(StoreLock { file })
    }

    fn read_value(&self) -> Result<u64, AllocatorError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AllocatorError::io(&self.path, e)),
        };

        let corrupted = |content: String| AllocatorError::CorruptedState {
            path: self.path.clone(),
            content,
        };

        let text = String::from_utf8(bytes)
            .map_err(|e| corrupted(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(corrupted(trimmed.to_string()));
        }

        trimmed
            .parse::<u64>()
            .map_err(|_| corrupted(trimmed.to_string()))
    }

    fn write_value(&self, value: u64) -> Result<(), AllocatorError> {
        let dir = self.parent_dir();

        let mut temp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| AllocatorError::io(&dir, e))?;
        temp.write_all(format!("{}\n", value).as_bytes())
            .map_err(|e| AllocatorError::io(temp.path(), e))?;
        self.copy_store_mode(temp.as_file())
            .map_err(|e| AllocatorError::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| AllocatorError::io(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| AllocatorError::io(&self.path, e.error))?;

        sync_dir(&dir)
    }

    // Temp files start out 0600; the replacement takes the store's current
    // mode, or NEW_STORE_MODE when there is no store yet.
    #[cfg(unix)]
    fn copy_store_mode(&self, file: &File) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let permissions = match fs::metadata(&self.path) {
            Ok(meta) => meta.permissions(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::Permissions::from_mode(NEW_STORE_MODE)
            }
            Err(e) => return Err(e),
        };
        file.set_permissions(permissions)
    }

    #[cfg(not(unix))]
    fn copy_store_mode(&self, _file: &File) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), AllocatorError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| AllocatorError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), AllocatorError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use tempfile::TempDir;

    fn allocator_in(dir: &TempDir) -> CallIdAllocator {
        CallIdAllocator::new(dir.path().join("data").join("call_id_track"))
    }

    #[test]
    fn test_fresh_store_yields_consecutive_ids() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);

        assert_eq!(allocator.allocate().unwrap(), 1);
        assert_eq!(allocator.allocate().unwrap(), 2);
        assert_eq!(allocator.allocate().unwrap(), 3);
    }

    #[test]
    fn test_peek_on_fresh_store_is_zero() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);

        assert_eq!(allocator.peek().unwrap(), 0);
        assert!(!allocator.path().exists());
    }

    #[test]
    fn test_peek_after_allocations() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);

        for _ in 0..5 {
            allocator.allocate().unwrap();
        }
        assert_eq!(allocator.peek().unwrap(), 5);
        assert_eq!(allocator.peek().unwrap(), 5);
    }

    #[test]
    fn test_store_format_is_newline_terminated_decimal() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);

        allocator.allocate().unwrap();
        allocator.allocate().unwrap();

        let content = fs::read_to_string(allocator.path()).unwrap();
        assert_eq!(content, "2\n");
    }

    #[test]
    fn test_parent_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let allocator = CallIdAllocator::new(dir.path().join("a/b/c/store"));

        assert_eq!(allocator.allocate().unwrap(), 1);
        assert!(dir.path().join("a/b/c/store").is_file());
        assert!(dir.path().join("a/b/c/store.lock").is_file());
    }

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn test_new_store_is_world_readable() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);

        allocator.allocate().unwrap();
        assert_eq!(mode_of(allocator.path()), 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrites_keep_store_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), "7\n").unwrap();
        fs::set_permissions(allocator.path(), fs::Permissions::from_mode(0o664)).unwrap();

        assert_eq!(allocator.allocate().unwrap(), 8);
        assert_eq!(mode_of(allocator.path()), 0o664);

        allocator.reset(3).unwrap();
        assert_eq!(mode_of(allocator.path()), 0o664);
        assert_eq!(allocator.peek().unwrap(), 3);
    }

    #[test]
    fn test_reset_then_peek() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);

        allocator.allocate().unwrap();
        allocator.reset(41).unwrap();
        assert_eq!(allocator.peek().unwrap(), 41);
        assert_eq!(allocator.allocate().unwrap(), 42);
    }

    #[test]
    fn test_reset_negative_is_rejected_and_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);

        allocator.allocate().unwrap();
        allocator.allocate().unwrap();

        let result = allocator.reset(-1);
        assert!(matches!(result, Err(AllocatorError::InvalidArgument(_))));
        assert_eq!(allocator.peek().unwrap(), 2);
    }

    #[test]
    fn test_empty_store_counts_as_zero() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), "").unwrap();

        assert_eq!(allocator.peek().unwrap(), 0);
        assert_eq!(allocator.allocate().unwrap(), 1);
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), "  17\n\n").unwrap();

        assert_eq!(allocator.allocate().unwrap(), 18);
    }

    #[test]
    fn test_corrupted_store_fails_every_operation() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), "forty-two\n").unwrap();

        assert!(matches!(
            allocator.allocate(),
            Err(AllocatorError::CorruptedState { .. })
        ));
        assert!(matches!(
            allocator.peek(),
            Err(AllocatorError::CorruptedState { .. })
        ));
        assert!(matches!(
            allocator.reset(0),
            Err(AllocatorError::CorruptedState { .. })
        ));

        // Nothing was overwritten along the way
        let content = fs::read_to_string(allocator.path()).unwrap();
        assert_eq!(content, "forty-two\n");
    }

    #[test]
    fn test_negative_content_is_corruption() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), "-4\n").unwrap();

        match allocator.allocate() {
            Err(AllocatorError::CorruptedState { content, .. }) => assert_eq!(content, "-4"),
            other => panic!("Expected CorruptedState, got {:?}", other),
        }
    }

    #[test]
    fn test_signed_content_is_corruption() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), "+4\n").unwrap();

        assert!(matches!(
            allocator.peek(),
            Err(AllocatorError::CorruptedState { .. })
        ));
    }

    #[test]
    fn test_non_utf8_content_is_corruption() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), [0xff, 0xfe, b'1']).unwrap();

        assert!(matches!(
            allocator.peek(),
            Err(AllocatorError::CorruptedState { .. })
        ));
    }

    #[test]
    fn test_counter_exhaustion() {
        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        fs::create_dir_all(allocator.path().parent().unwrap()).unwrap();
        fs::write(allocator.path(), format!("{}\n", u64::MAX)).unwrap();

        assert!(matches!(
            allocator.allocate(),
            Err(AllocatorError::Exhausted(_))
        ));
        assert_eq!(allocator.peek().unwrap(), u64::MAX);
    }

    #[test]
    fn test_concurrent_threads_get_unique_consecutive_ids() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let dir = TempDir::new().unwrap();
        let allocator = allocator_in(&dir);
        allocator.reset(100).unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| allocator.allocate().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();

        let unique: HashSet<u64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);

        let expected: Vec<u64> = (101..=100 + (THREADS * PER_THREAD) as u64).collect();
        assert_eq!(ids, expected);
        assert_eq!(allocator.peek().unwrap(), 100 + (THREADS * PER_THREAD) as u64);
    }

    #[test]
    fn test_lock_path_is_sidecar() {
        let allocator = CallIdAllocator::new("/var/lib/outdial/ids");
        assert_eq!(allocator.lock_path(), Path::new("/var/lib/outdial/ids.lock"));
    }
}
