use crate::{
    CounterStore, DateKey, DateSource, Error, Prefix, Result, Serial, SerialAllocator,
};
use chrono::NaiveDate;
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// How long an allocation waits for exclusive access to its date.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// How many times a read-modify-write cycle is repeated after the store
/// reports a concurrent modification.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Once the lock table grows past this many dates, idle entries are pruned.
pub(crate) const LOCK_TABLE_SOFT_CAP: usize = 64;

type DayLock = Arc<Mutex<()>>;

/// A lock-based serial allocator suitable for multi-threaded environments.
///
/// Each allocation runs its read-modify-write cycle while holding two locks
/// scoped to the date being allocated:
///
/// - an in-process mutex, taken from a table keyed by [`DateKey`]
/// - the store's own lock ([`CounterStore::lock`]), which for
///   [`FileStore`] excludes other processes too
///
/// Both are acquired with a bounded timeout. Allocations for different dates
/// never contend.
///
/// ## Features
/// - ✅ Thread-safe and process-safe with [`FileStore`]
/// - ✅ Unique, gap-free counters per date
/// - ✅ Refuses to allocate over a corrupt record
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use dayseq::{FixedDate, LockSerialAllocator, MemoryStore, Prefix, SerialAllocator};
///
/// let today = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
/// let allocator = LockSerialAllocator::new(
///     Prefix::new("ORG").unwrap(),
///     MemoryStore::new(),
///     FixedDate(today),
/// );
///
/// assert_eq!(allocator.try_allocate().unwrap().to_string(), "ORG20240307001");
/// assert_eq!(allocator.try_allocate().unwrap().to_string(), "ORG20240307002");
/// ```
///
/// [`FileStore`]: crate::FileStore
pub struct LockSerialAllocator<S, D>
where
    S: CounterStore,
    D: DateSource,
{
    prefix: Prefix,
    store: S,
    dates: D,
    lock_timeout: Duration,
    pub(crate) day_locks: Mutex<HashMap<DateKey, DayLock>>,
}

impl<S, D> LockSerialAllocator<S, D>
where
    S: CounterStore,
    D: DateSource,
{
    /// Creates an allocator with the [`DEFAULT_LOCK_TIMEOUT`].
    pub fn new(prefix: Prefix, store: S, dates: D) -> Self {
        Self {
            prefix,
            store,
            dates,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            day_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides how long an allocation may wait for its date.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn dates(&self) -> &D {
        &self.dates
    }

    fn day_lock(&self, date_key: DateKey) -> DayLock {
        let mut table = self.day_locks.lock();
        if table.len() >= LOCK_TABLE_SOFT_CAP && !table.contains_key(&date_key) {
            // Only the table itself references idle entries.
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(table.entry(date_key).or_default())
    }

    /// Allocates the next serial for `date_key`.
    ///
    /// # Errors
    ///
    /// See [`SerialAllocator::try_allocate`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(prefix = %self.prefix)))]
    pub fn try_allocate_key(&self, date_key: DateKey) -> Result<Serial> {
        let day_lock = self.day_lock(date_key);
        let _day = day_lock.try_lock_for(self.lock_timeout).ok_or_else(|| {
            #[cfg(feature = "tracing")]
            tracing::warn!(%date_key, timeout = ?self.lock_timeout, "gave up waiting for day lock");
            Error::lock_timeout(date_key, self.lock_timeout)
        })?;
        let _store = self.store.lock(date_key, self.lock_timeout)?;

        for _attempt in 0..MAX_CAS_ATTEMPTS {
            let last = self.store.load(date_key).inspect_err(|_e| {
                #[cfg(feature = "tracing")]
                log_load_failure(_e);
            })?;
            let next = last
                .unwrap_or(0)
                .checked_add(1)
                .ok_or(Error::CounterExhausted { date_key })?;

            if self.store.compare_and_swap(date_key, last, next)? {
                return Ok(Serial::new(self.prefix.clone(), date_key, next));
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(%date_key, attempt = _attempt, "counter changed underneath allocation, retrying");
        }

        Err(Error::StorageUnavailable {
            reason: format!(
                "counter for {date_key} kept changing across {MAX_CAS_ATTEMPTS} attempts"
            ),
        })
    }
}

#[cfg(feature = "tracing")]
fn log_load_failure(err: &Error) {
    match err {
        Error::CorruptState { date_key, raw } => {
            tracing::error!(%date_key, raw = ?raw, "refusing to allocate over corrupt counter");
        }
        other => tracing::warn!(error = %other, "failed to read counter"),
    }
}

impl<S, D> SerialAllocator for LockSerialAllocator<S, D>
where
    S: CounterStore,
    D: DateSource + Send + Sync,
{
    fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    fn try_allocate(&self) -> Result<Serial> {
        self.try_allocate_on(self.dates.today())
    }

    fn try_allocate_on(&self, date: NaiveDate) -> Result<Serial> {
        self.try_allocate_key(DateKey::try_from(date)?)
    }

    fn last_issued(&self, date_key: DateKey) -> Result<u64> {
        Ok(self.store.load(date_key)?.unwrap_or(0))
    }
}
