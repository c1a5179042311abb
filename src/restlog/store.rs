//! Persistence collaborator for request logs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::LogRecord;

/// Errors reported by a [`LogStore`].
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("log store unavailable: {0}")]
    Unavailable(String),

    #[error("log record rejected: {0}")]
    Rejected(String),
}

/// Storage for request log records.
///
/// The mediation core only ever saves a whole record and asks how many
/// records for an identity are newer than a timestamp. Each `save` creates a
/// new record; there is no update path.
pub trait LogStore: Send + Sync {
    /// Persist a new record, returning its id.
    fn save(&self, record: LogRecord) -> Result<u64, LogStoreError>;

    /// Count records whose `field` equals `value` and whose `requested`
    /// timestamp is strictly after `since`.
    fn count_since(
        &self,
        field: &str,
        value: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, LogStoreError>;

    /// Drop records requested before `cutoff`. Returns how many were removed.
    fn prune_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, LogStoreError> {
        Ok(0)
    }

    /// Number of stored records, when the backend can tell cheaply.
    fn record_count(&self) -> Option<u64> {
        None
    }
}

/// In-process log store backed by a vector.
///
/// Suitable for a single instance and for tests; counts are exact as of the
/// moment the lock is taken.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    records: Mutex<Vec<(u64, LogRecord)>>,
    next_id: AtomicU64,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored records in insertion order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<(u64, LogRecord)>>, LogStoreError> {
        self.records
            .lock()
            .map_err(|_| LogStoreError::Unavailable("memory log store lock poisoned".to_string()))
    }
}

impl LogStore for MemoryLogStore {
    fn save(&self, record: LogRecord) -> Result<u64, LogStoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock()?.push((id, record));
        Ok(id)
    }

    fn count_since(
        &self,
        field: &str,
        value: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, LogStoreError> {
        let records = self.lock()?;
        let count = records
            .iter()
            .filter(|(_, r)| r.get_str(field).as_deref() == Some(value))
            .filter(|(_, r)| r.requested_at().is_some_and(|at| at > since))
            .count();
        Ok(count as u64)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, LogStoreError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|(_, r)| r.requested_at().is_none_or(|at| at >= cutoff));
        Ok((before - records.len()) as u64)
    }

    fn record_count(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::restlog::format_log_time;
    use chrono::Duration;

    fn record(apikey: &str, ip: &str, at: DateTime<Utc>) -> LogRecord {
        let mut r = LogRecord::new();
        r.insert("apikey", apikey);
        r.insert("ip", ip);
        r.insert("requested", format_log_time(at));
        r
    }

    #[test]
    fn test_save_assigns_increasing_ids() {
        let store = MemoryLogStore::new();
        let a = store.save(LogRecord::new()).unwrap();
        let b = store.save(LogRecord::new()).unwrap();
        assert!(b > a);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_count_since_filters_identity_and_time() {
        let store = MemoryLogStore::new();
        let now = Utc::now();
        store.save(record("k1", "1.1.1.1", now - Duration::minutes(5))).unwrap();
        store.save(record("k1", "1.1.1.1", now - Duration::hours(2))).unwrap();
        store.save(record("k2", "1.1.1.1", now - Duration::minutes(5))).unwrap();

        let since = now - Duration::hours(1);
        assert_eq!(store.count_since("apikey", "k1", since).unwrap(), 1);
        assert_eq!(store.count_since("apikey", "k2", since).unwrap(), 1);
        assert_eq!(store.count_since("ip", "1.1.1.1", since).unwrap(), 2);
        assert_eq!(store.count_since("apikey", "nobody", since).unwrap(), 0);
    }

    #[test]
    fn test_prune_before() {
        let store = MemoryLogStore::new();
        let now = Utc::now();
        store.save(record("k1", "ip", now - Duration::days(3))).unwrap();
        store.save(record("k1", "ip", now)).unwrap();

        let removed = store.prune_before(now - Duration::days(1)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.record_count(), Some(1));
    }
}
