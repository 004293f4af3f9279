//! StateStore — redb-backed persistence for training metadata.
//!
//! Values are JSON-serialized into redb's `&[u8]` value column, keyed by
//! metric name. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::TrainingRecord;

/// Training records keyed by metric name.
const TRAININGS: TableDefinition<&str, &[u8]> = TableDefinition::new("trainings");

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TRAININGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Record the latest training for a metric, replacing any prior record.
    pub fn put_training(&self, record: &TrainingRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TRAININGS).map_err(map_err!(Table))?;
            table
                .insert(record.metric.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(metric = %record.metric, trained_at = %record.trained_at, "training recorded");
        Ok(())
    }

    /// Get the latest training record for a metric, if one exists.
    pub fn get_training(&self, metric: &str) -> StateResult<Option<TrainingRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TRAININGS).map_err(map_err!(Table))?;
        match table.get(metric).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: TrainingRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(metric: &str) -> TrainingRecord {
        TrainingRecord {
            metric: metric.to_string(),
            trained_at: Utc::now(),
            training_points: 1440,
        }
    }

    #[test]
    fn put_and_get_training() {
        let store = StateStore::open_in_memory().unwrap();
        let rec = record("chat_messages_per_second");

        store.put_training(&rec).unwrap();
        let loaded = store.get_training("chat_messages_per_second").unwrap();
        assert_eq!(loaded, Some(rec));
    }

    #[test]
    fn get_missing_metric_is_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.get_training("nope").unwrap(), None);
    }

    #[test]
    fn put_replaces_prior_record() {
        let store = StateStore::open_in_memory().unwrap();
        let first = record("m");
        store.put_training(&first).unwrap();

        let mut second = record("m");
        second.training_points = 42;
        store.put_training(&second).unwrap();

        let loaded = store.get_training("m").unwrap().unwrap();
        assert_eq!(loaded.training_points, 42);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loadcast.redb");

        {
            let store = StateStore::open(&path).unwrap();
            store.put_training(&record("m")).unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert!(store.get_training("m").unwrap().is_some());
    }
}
