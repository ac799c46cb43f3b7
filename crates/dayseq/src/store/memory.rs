use crate::{CounterStore, DateKey, Error, Result, store::interface::parse_counter};
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A volatile [`CounterStore`] for tests and benchmarks.
///
/// Counters are kept as raw text, like on disk, so corrupt records can be
/// seeded with [`MemoryStore::seed_raw`]. Outages can be simulated with
/// [`MemoryStore::set_available`].
///
/// Nothing survives the process: do not use this in production.
#[derive(Debug)]
pub struct MemoryStore {
    records: Mutex<HashMap<DateKey, String>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Overwrites the stored text for `date_key` without validation.
    pub fn seed_raw(&self, date_key: DateKey, raw: impl Into<String>) {
        self.records.lock().insert(date_key, raw.into());
    }

    /// Returns the stored text for `date_key`, if any.
    pub fn raw(&self, date_key: DateKey) -> Option<String> {
        self.records.lock().get(&date_key).cloned()
    }

    /// Makes every subsequent operation fail with
    /// [`Error::StorageUnavailable`] while `available` is false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StorageUnavailable {
                reason: "memory store marked unavailable".to_owned(),
            })
        }
    }
}

impl CounterStore for MemoryStore {
    type Guard<'a> = ();

    fn lock(&self, _date_key: DateKey, _timeout: Duration) -> Result<()> {
        self.check_available()
    }

    fn load(&self, date_key: DateKey) -> Result<Option<u64>> {
        self.check_available()?;
        self.records
            .lock()
            .get(&date_key)
            .map(|raw| parse_counter(date_key, raw))
            .transpose()
    }

    fn compare_and_swap(&self, date_key: DateKey, current: Option<u64>, next: u64) -> Result<bool> {
        self.check_available()?;
        let mut records = self.records.lock();
        let stored = records
            .get(&date_key)
            .map(|raw| parse_counter(date_key, raw))
            .transpose()?;
        if stored != current {
            return Ok(false);
        }
        records.insert(date_key, next.to_string());
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
    fn absent_record_loads_as_none() {
        let store = MemoryStore::new();
        assert_eq!(store.load(key()).unwrap(), None);
    }

    #[test]
    fn compare_and_swap_rejects_stale_expectation() {
        let store = MemoryStore::new();
        assert!(store.compare_and_swap(key(), None, 1).unwrap());
        assert!(!store.compare_and_swap(key(), None, 1).unwrap());
        assert!(!store.compare_and_swap(key(), Some(5), 6).unwrap());
        assert!(store.compare_and_swap(key(), Some(1), 2).unwrap());
        assert_eq!(store.load(key()).unwrap(), Some(2));
    }

    #[test]
    fn corrupt_record_reports_raw_text() {
        let store = MemoryStore::new();
        store.seed_raw(key(), "twelve");
        assert_eq!(
            store.load(key()),
            Err(Error::CorruptState {
                date_key: key(),
                raw: "twelve".to_owned(),
            })
        );
    }

    #[test]
    fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(store.load(key()), Err(Error::StorageUnavailable { .. })));
        assert!(matches!(
            store.lock(key(), Duration::ZERO),
            Err(Error::StorageUnavailable { .. })
        ));
        assert!(matches!(
            store.compare_and_swap(key(), None, 1),
            Err(Error::StorageUnavailable { .. })
        ));
        assert_eq!(store.raw(key()), None);
    }
}
