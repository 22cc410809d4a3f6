use rusqlite::Connection;
use std::cell::RefCell;
use std::path::PathBuf;

use crate::errors::StoreError;
use tracing::debug;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

// Thread-local connection slot, keyed by path so handles to different
// databases never share a connection.
thread_local! {
    static DB_CONN: RefCell<Option<(PathBuf, Connection)>> = const { RefCell::new(None) };
}

/// Cheap, cloneable handle to the listing database. Each thread lazily opens
/// its own connection (WAL mode, busy timeout), so many ingestion and search
/// callers can run concurrently; SQLite's single-writer lock serializes the
/// actual writes.
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Provides this thread's connection to the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        DB_CONN
            .try_with(|cell| {
                let mut slot = cell.borrow_mut();
                let reusable = matches!(&*slot, Some((path, _)) if *path == self.path);
                if !reusable {
                    let conn = open_connection(&self.path)?;
                    *slot = Some((self.path.clone(), conn));
                }
                let (_, conn) = slot.as_mut().unwrap();
                f(conn)
            })
            .map_err(|e| StoreError::StorageUnavailable(format!("thread-local access: {e}")))?
    }
}

fn open_connection(path: &PathBuf) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)
        .map_err(|e| StoreError::StorageUnavailable(format!("open db failed: {e}")))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA foreign_keys = ON;",
    )
    .map_err(|e| StoreError::StorageUnavailable(format!("pragma setup failed: {e}")))?;
    Ok(conn)
}

/// Apply the embedded schema. Idempotent; call once at startup.
pub fn init_db(db: &Database) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::StorageUnavailable(format!("failed to apply schema: {e}")))?;
        Ok(())
    })?;

    debug!("schema applied");
    Ok(())
}
