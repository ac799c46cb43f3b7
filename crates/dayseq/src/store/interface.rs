use crate::{DateKey, Error, Result};
use core::time::Duration;

/// Durable mapping from [`DateKey`] to the last counter issued on that day.
///
/// Implementations provide the storage half of the allocation cycle. The
/// allocator drives it as:
///
/// 1. [`CounterStore::lock`] the date (held for the whole cycle)
/// 2. [`CounterStore::load`] the last issued counter
/// 3. [`CounterStore::compare_and_swap`] in the incremented value
///
/// `compare_and_swap` must be durable when it returns `Ok(true)`: a crash
/// afterwards never loses the write, and a crash before it never exposes a
/// partial value.
pub trait CounterStore: Send + Sync {
    /// Proof of exclusive access to one date, released on drop.
    type Guard<'a>
    where
        Self: 'a;

    /// Acquires store-level exclusive access to `date_key`.
    ///
    /// In-process exclusion is already provided by the allocator, so stores
    /// that are only reachable from one process may return a no-op guard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if access cannot be obtained
    /// within `timeout`.
    fn lock(&self, date_key: DateKey, timeout: Duration) -> Result<Self::Guard<'_>>;

    /// Reads the last issued counter, or `None` if the date was never used.
    ///
    /// # Errors
    ///
    /// - [`Error::StorageUnavailable`] if the record cannot be read
    /// - [`Error::CorruptState`] if the record is not a non-negative integer
    fn load(&self, date_key: DateKey) -> Result<Option<u64>>;

    /// Persists `next` only if the stored value still equals `current`.
    ///
    /// Returns `Ok(false)` without writing when the stored value moved,
    /// which tells the allocator to rerun the whole cycle.
    ///
    /// # Errors
    ///
    /// Same as [`CounterStore::load`], plus write failures.
    fn compare_and_swap(&self, date_key: DateKey, current: Option<u64>, next: u64)
    -> Result<bool>;
}

/// Parses a stored counter, reporting the raw text on failure.
pub(crate) fn parse_counter(date_key: DateKey, raw: &str) -> Result<u64> {
    raw.trim().parse().map_err(|_| Error::CorruptState {
        date_key,
        raw: raw.to_owned(),
    })
}
