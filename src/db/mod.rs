use rusqlite::Connection;
use std::path::Path;
use tokio::sync::oneshot;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::error::{BionetError, Result};

// WAL mode so readers never block each other, NORMAL sync for speed,
// 64MB page cache and 256MB mmap for the read-heavy traversal workload.
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -65536; \
     PRAGMA mmap_size = 268435456; \
     PRAGMA wal_autocheckpoint = 1000;";

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = open_configured(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| BionetError::WorkerFailed(format!("database task: {}", e)))?
    }

    /// Like [`Db::with_connection`], but cancelling `cancel` interrupts the
    /// running statement and waits for the blocking task to wind down.
    pub async fn with_connection_cancellable<F, T>(
        &self,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(BionetError::Cancelled);
        }

        let path = self.path.clone();
        let (handle_tx, handle_rx) = oneshot::channel();
        let mut work = task::spawn_blocking(move || {
            let mut conn = open_configured(&path)?;
            let _ = handle_tx.send(conn.get_interrupt_handle());
            f(&mut conn)
        });

        // Sender is dropped without a value when the open itself failed.
        let interrupt = handle_rx.await.ok();

        // Cancellation wins even when the statement finished in the same poll.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Some(handle) = interrupt {
                    handle.interrupt();
                }
                let _ = work.await;
                log::debug!("Interrupted in-flight query on {}", self.path.display());
                Err(BionetError::Cancelled)
            }
            joined = &mut work => {
                joined.map_err(|e| BionetError::WorkerFailed(format!("database task: {}", e)))?
            }
        }
    }
}

fn open_configured(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(BionetError::Database)?;
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    Ok(conn)
}

pub mod migrate;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db
            .with_connection(|conn| {
                conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                    .map_err(BionetError::Database)?;
                Ok(())
            })
            .await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_pragmas_set() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));

        db.with_connection(|conn| {
            let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
            assert_eq!(journal_mode.to_uppercase(), "WAL");

            let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
            assert_eq!(foreign_keys, 1);

            Ok::<(), BionetError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cancellable_runs_to_completion() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let token = CancellationToken::new();

        let value = db
            .with_connection_cancellable(&token, |conn| {
                Ok(conn.query_row("SELECT 41 + 1", [], |row| row.get::<_, i64>(0))?)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cancellable_rejects_already_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let token = CancellationToken::new();
        token.cancel();

        let result = db
            .with_connection_cancellable(&token, |_conn| Ok(()))
            .await;
        assert!(matches!(result, Err(BionetError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellation_reported_over_finished_work() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let token = CancellationToken::new();

        let inner = token.clone();
        let result = db
            .with_connection_cancellable(&token, move |conn| {
                let n: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
                inner.cancel();
                Ok(n)
            })
            .await;
        assert!(matches!(result, Err(BionetError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellable_interrupts_long_query() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        // Unbounded recursive CTE: only an interrupt ends it.
        let result = db
            .with_connection_cancellable(&token, |conn| {
                let n: i64 = conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                     SELECT count(*) FROM c",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await;
        assert!(matches!(result, Err(BionetError::Cancelled)));
    }
}
