//! SQLite store for persisted hierarchies.
//!
//! One [`Store`] is opened at startup and cloned into every component that
//! needs it. All work goes through a single connection behind a mutex, so
//! writers are serialized and a reader never sees a half-written hierarchy.
//! Methods are blocking; async callers should use `spawn_blocking`.

mod persist;
mod tree;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, Result, TransactionBehavior};
use tracing::{debug, info};

use crate::schema::{Hierarchy, ProcessNode};

const SCHEMA: &str = include_str!("../../db/schema.sql");

/// Shared handle to the relational store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database file and apply the fixed schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!("Opened SQLite database at {:?}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // A panic mid-transaction drops the transaction, which rolls it back,
    // so the connection behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a whole hierarchy atomically and return it annotated with ids.
    pub fn persist(&self, hierarchy: &Hierarchy) -> Result<Vec<ProcessNode>> {
        persist::persist(&mut self.lock(), hierarchy)
    }

    /// Rebuild the full nested tree from the three tables.
    pub fn read_all(&self) -> Result<Vec<ProcessNode>> {
        tree::read_all(&self.lock())
    }

    /// Delete every use case, subprocess and process, then reclaim space.
    pub fn reset_all(&self) -> Result<()> {
        let mut conn = self.lock();

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let use_cases = tx.execute("DELETE FROM use_case", [])?;
        let subprocesses = tx.execute("DELETE FROM subprocess", [])?;
        let processes = tx.execute("DELETE FROM process", [])?;
        tx.commit()?;

        // VACUUM cannot run inside a transaction.
        conn.execute_batch("VACUUM")?;

        debug!(
            "Reset store: removed {} processes, {} subprocesses, {} use cases",
            processes, subprocesses, use_cases
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn row_counts(&self) -> (i64, i64, i64) {
        let conn = self.lock();
        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap()
        };
        (count("process"), count("subprocess"), count("use_case"))
    }
}
