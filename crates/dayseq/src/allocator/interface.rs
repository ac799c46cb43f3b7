use crate::{DateKey, Prefix, Result, Serial};
use chrono::NaiveDate;

/// A minimal interface for allocating day-scoped serials.
///
/// Object safe, so services can hold an `Arc<dyn SerialAllocator>` and tests
/// can swap in any store or date source.
pub trait SerialAllocator: Send + Sync {
    /// The prefix stamped on every serial.
    fn prefix(&self) -> &Prefix;

    /// Allocates the next serial for today.
    ///
    /// # Errors
    ///
    /// - [`Error::StorageUnavailable`] if the counter store cannot be reached
    ///   or the date stays locked past the timeout
    /// - [`Error::CorruptState`] if today's record is damaged
    /// - [`Error::CounterExhausted`] if today's counter is at `u64::MAX`
    ///
    /// [`Error::StorageUnavailable`]: crate::Error::StorageUnavailable
    /// [`Error::CorruptState`]: crate::Error::CorruptState
    /// [`Error::CounterExhausted`]: crate::Error::CounterExhausted
    fn try_allocate(&self) -> Result<Serial>;

    /// Allocates the next serial for an explicit calendar date.
    ///
    /// # Errors
    ///
    /// As [`SerialAllocator::try_allocate`], plus
    /// [`Error::InvalidDateKey`](crate::Error::InvalidDateKey) for dates
    /// outside years `0..=9999`.
    fn try_allocate_on(&self, date: NaiveDate) -> Result<Serial>;

    /// Returns the last counter issued for `date_key` (0 if none) without
    /// allocating.
    ///
    /// # Errors
    ///
    /// Same storage errors as [`SerialAllocator::try_allocate`].
    fn last_issued(&self, date_key: DateKey) -> Result<u64>;
}
