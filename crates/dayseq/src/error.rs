use crate::DateKey;
use core::time::Duration;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `dayseq` can produce.
///
/// Allocation never falls back to a fabricated serial: every failure is
/// surfaced to the immediate caller, who decides whether to retry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The durable counter store could not be read or written, or exclusive
    /// access to a date could not be obtained in time.
    ///
    /// Nothing was committed. Callers may retry with backoff.
    #[error("counter store unavailable: {reason}")]
    StorageUnavailable {
        /// Human readable context, including the underlying I/O error.
        reason: String,
    },

    /// The persisted counter for `date_key` is not a non-negative integer.
    ///
    /// Allocation for that date is refused until an operator repairs the
    /// record. Resetting to zero would risk reissuing serials.
    #[error("corrupt counter for {date_key}: {raw:?}")]
    CorruptState {
        /// The date whose record is damaged.
        date_key: DateKey,
        /// The stored value as read from the store.
        raw: String,
    },

    /// The counter for `date_key` already reached `u64::MAX`.
    #[error("counter exhausted for {date_key}")]
    CounterExhausted {
        /// The date that ran out of serials.
        date_key: DateKey,
    },

    /// A serial prefix failed validation.
    #[error("invalid prefix: {reason}")]
    InvalidPrefix {
        /// Which rule the prefix broke.
        reason: &'static str,
    },

    /// A string or date could not be turned into a [`DateKey`].
    #[error("invalid date key: {input:?}")]
    InvalidDateKey {
        /// The rejected input.
        input: String,
    },

    /// A UTC offset string could not be parsed.
    #[error("invalid utc offset: {input:?}")]
    InvalidUtcOffset {
        /// The rejected input.
        input: String,
    },

    /// A string is not a canonical serial.
    #[error("invalid serial: {input:?}")]
    InvalidSerial {
        /// The rejected input.
        input: String,
    },
}

impl Error {
    pub(crate) fn io(context: impl core::fmt::Display, err: &std::io::Error) -> Self {
        Self::StorageUnavailable {
            reason: format!("{context}: {err}"),
        }
    }

    pub(crate) fn lock_timeout(date_key: DateKey, timeout: Duration) -> Self {
        Self::StorageUnavailable {
            reason: format!(
                "timed out after {}ms waiting for exclusive access to {date_key}",
                timeout.as_millis()
            ),
        }
    }

    /// Returns `true` if the error is transient and the operation may
    /// succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}
