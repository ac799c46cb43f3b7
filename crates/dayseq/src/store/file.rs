use crate::{CounterStore, DateKey, Error, Result, store::interface::parse_counter};
use core::time::Duration;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Initial back-off while waiting on another process's lock.
const LOCK_POLL_START: Duration = Duration::from_micros(50);
/// Upper bound on the back-off between lock attempts.
const LOCK_POLL_MAX: Duration = Duration::from_millis(5);

/// A durable [`CounterStore`] keeping one file per day in a directory.
///
/// Layout for 2024-03-07:
///
/// - `20240307.seq`: the decimal counter, replaced atomically by writing a
///   temp file, `fsync`ing it and renaming it over the old record
/// - `20240307.lock`: an advisory exclusive lock, so several processes can
///   share one directory safely
///
/// Records are never deleted.
///
/// # Example
///
/// ```
/// use dayseq::{CounterStore, DateKey, FileStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = FileStore::open(dir.path()).unwrap();
/// let key: DateKey = "20240307".parse().unwrap();
/// assert_eq!(store.load(key).unwrap(), None);
/// ```
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

/// Holds a day's `.lock` file exclusively until dropped.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well.
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the directory cannot be
    /// created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::io(format_args!("creating {}", dir.display()), &e))?;
        Ok(Self { dir })
    }

    /// The directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the counter record for `date_key`.
    pub fn record_path(&self, date_key: DateKey) -> PathBuf {
        self.dir.join(format!("{date_key}.seq"))
    }

    fn lock_path(&self, date_key: DateKey) -> PathBuf {
        self.dir.join(format!("{date_key}.lock"))
    }

    fn temp_path(&self, date_key: DateKey) -> PathBuf {
        self.dir
            .join(format!("{date_key}.seq.{}.tmp", std::process::id()))
    }

    fn write_record(&self, date_key: DateKey, value: u64) -> io::Result<()> {
        self.write_record_with(date_key, value, sync_dir)
    }

    /// Replaces the record, then syncs its directory with `sync`.
    ///
    /// Once the rename has succeeded the new value is what every later read
    /// sees, so a failed directory sync is logged and the write still counts
    /// as committed.
    fn write_record_with(
        &self,
        date_key: DateKey,
        value: u64,
        sync: impl FnOnce(&Path) -> io::Result<()>,
    ) -> io::Result<()> {
        let temp = self.temp_path(date_key);
        let replaced = (|| {
            let mut file = File::create(&temp)?;
            writeln!(file, "{value}")?;
            file.sync_all()?;
            fs::rename(&temp, self.record_path(date_key))
        })();
        if let Err(e) = replaced {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        if let Err(_e) = sync(&self.dir) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%date_key, value, error = %_e, "record replaced but directory sync failed");
        }
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directory handles cannot be fsynced on this platform; rename durability is
// left to the filesystem.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl CounterStore for FileStore {
    type Guard<'a> = FileLockGuard;

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn lock(&self, date_key: DateKey, timeout: Duration) -> Result<FileLockGuard> {
        let path = self.lock_path(date_key);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(format_args!("opening {}", path.display()), &e))?;

        let deadline = Instant::now() + timeout;
        let mut backoff = LOCK_POLL_START;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(FileLockGuard { file }),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let now = Instant::now();
                    if now >= deadline {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(%date_key, ?timeout, "gave up waiting for file lock");
                        return Err(Error::lock_timeout(date_key, timeout));
                    }
                    std::thread::sleep(backoff.min(deadline - now));
                    backoff = (backoff * 2).min(LOCK_POLL_MAX);
                }
                Err(e) => {
                    return Err(Error::io(format_args!("locking {}", path.display()), &e));
                }
            }
        }
    }

    fn load(&self, date_key: DateKey) -> Result<Option<u64>> {
        let path = self.record_path(date_key);
        match fs::read_to_string(&path) {
            Ok(raw) => parse_counter(date_key, &raw).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(format_args!("reading {}", path.display()), &e)),
        }
    }

    fn compare_and_swap(&self, date_key: DateKey, current: Option<u64>, next: u64) -> Result<bool> {
        if self.load(date_key)? != current {
            return Ok(false);
        }
        self.write_record(date_key, next).map_err(|e| {
            Error::io(
                format_args!("writing {}", self.record_path(date_key).display()),
                &e,
            )
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DateKey {
        "20240307".parse().unwrap()
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            assert!(store.compare_and_swap(key(), None, 1).unwrap());
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.load(key()).unwrap(), Some(1));
        assert_eq!(fs::read_to_string(store.record_path(key())).unwrap(), "1\n");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested.as_path());
    }

    #[test]
    fn compare_and_swap_rejects_stale_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.compare_and_swap(key(), None, 1).unwrap());
        assert!(!store.compare_and_swap(key(), None, 1).unwrap());
        assert!(store.compare_and_swap(key(), Some(1), 2).unwrap());
        assert_eq!(store.load(key()).unwrap(), Some(2));
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for n in 1..=3 {
            assert!(store.compare_and_swap(key(), (n > 1).then(|| n - 1), n).unwrap());
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "found {leftovers:?}");
    }

    #[test]
    fn failed_directory_sync_still_commits() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .write_record_with(key(), 1, |_| Err(io::Error::other("sync refused")))
            .unwrap();
        assert_eq!(store.load(key()).unwrap(), Some(1));
        assert!(store.compare_and_swap(key(), Some(1), 2).unwrap());
        assert_eq!(store.load(key()).unwrap(), Some(2));
    }

    #[test]
    fn failed_replace_leaves_record_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.compare_and_swap(key(), None, 1).unwrap());
        // A non-empty directory at the record path makes the rename fail.
        fs::remove_file(store.record_path(key())).unwrap();
        fs::create_dir(store.record_path(key())).unwrap();
        fs::write(store.record_path(key()).join("keep"), "").unwrap();

        assert!(store.write_record_with(key(), 2, |_| Ok(())).is_err());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "found {leftovers:?}");
    }

    #[test]
    fn corrupt_record_reports_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(store.record_path(key()), "abc").unwrap();
        assert_eq!(
            store.load(key()),
            Err(Error::CorruptState {
                date_key: key(),
                raw: "abc".to_owned(),
            })
        );
        assert!(matches!(
            store.compare_and_swap(key(), Some(3), 4),
            Err(Error::CorruptState { .. })
        ));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(store.record_path(key()), " 17 \n").unwrap();
        assert_eq!(store.load(key()).unwrap(), Some(17));
    }

    #[test]
    fn lock_times_out_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileStore::open(dir.path()).unwrap();
        let second = FileStore::open(dir.path()).unwrap();

        let guard = first.lock(key(), Duration::from_millis(100)).unwrap();
        let started = Instant::now();
        let err = second.lock(key(), Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
        assert!(started.elapsed() >= Duration::from_millis(30));

        drop(guard);
        assert!(second.lock(key(), Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn locks_are_scoped_to_one_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let other: DateKey = "20240308".parse().unwrap();

        let _guard = store.lock(key(), Duration::from_millis(100)).unwrap();
        assert!(store.lock(other, Duration::ZERO).is_ok());
    }

    #[test]
    fn unreadable_record_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        // A directory in place of the record makes the read fail.
        fs::create_dir(store.record_path(key())).unwrap();
        assert!(matches!(
            store.load(key()),
            Err(Error::StorageUnavailable { .. })
        ));
    }
}
