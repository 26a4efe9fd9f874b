use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Thread-safe handle to the redb store.
///
/// redb serializes writers internally, so the handle is shared freely between
/// request handlers and the push dispatcher without extra locking.
#[derive(Clone)]
pub struct Store {
    pub(crate) db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("open redb database: {}", path.display()))?;

        // Ensure all tables exist so read transactions never hit a missing table.
        let write_txn = db.begin_write()?;
        write_txn.open_table(COUNTERS)?;
        write_txn.open_table(super::users::USERS)?;
        write_txn.open_table(super::users::USERS_BY_EMAIL)?;
        write_txn.open_table(super::notes::NOTES)?;
        write_txn.open_table(super::subscriptions::PUSH_SUBSCRIPTIONS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    pub(crate) fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Allocate the next id in the `seq_key` sequence. Ids start at 1.
    pub(crate) fn next_id(write_txn: &WriteTransaction, seq_key: &str) -> Result<u64> {
        let mut counters = write_txn.open_table(COUNTERS)?;
        let seq = counters.get(seq_key)?.map(|g| g.value()).unwrap_or(0) + 1;
        counters.insert(seq_key, seq)?;
        Ok(seq)
    }
}

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode::config::standard()).context("bincode encode")
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.is_empty() {
        anyhow::bail!("empty record");
    }
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(record)
}
