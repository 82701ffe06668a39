use super::traits::{PersistedRecord, Storage, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Check if a process with the given PID is still running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use std::process::Command;
        Command::new("ps")
            .arg("-p")
            .arg(pid.to_string())
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        // On non-Unix systems, assume process is running to be safe
        let _ = pid;
        true
    }
}

/// Extract PID from DuckDB lock error message
fn extract_pid_from_lock_error(error_msg: &str) -> Option<u32> {
    // Error format: "... (PID 12345) ..."
    let start = error_msg.find("(PID ")? + 5;
    let end = error_msg[start..].find(')')?;
    error_msg[start..start + end].parse().ok()
}

/// Remove DuckDB WAL and lock files left behind by a dead process
fn remove_lock_files(db_path: &Path) -> std::io::Result<()> {
    for suffix in ["wal", "lock"] {
        let stale = PathBuf::from(format!("{}.{}", db_path.display(), suffix));
        if stale.exists() {
            std::fs::remove_file(&stale)?;
            tracing::info!("Removed stale {} file: {}", suffix, stale.display());
        }
    }
    Ok(())
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|_| StorageError::Generic("connection mutex poisoned".to_string()))
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::Generic(format!("Task join error: {}", e))
}

/// DuckDB implementation of the Storage trait
pub struct DuckDbStorage {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStorage {
    /// Open (or create) the database file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Unavailable(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        match Connection::open(path) {
            Ok(conn) => Ok(Self::from_connection(conn)),
            Err(e) => {
                let error_msg = e.to_string();

                if error_msg.contains("Could not set lock") {
                    tracing::warn!("Database lock detected: {}", error_msg);

                    if let Some(pid) = extract_pid_from_lock_error(&error_msg) {
                        tracing::info!("Lock is held by PID {}, checking if process is running", pid);

                        if !is_process_running(pid) {
                            tracing::warn!("Process {} is not running, removing stale lock files", pid);

                            if let Err(io_err) = remove_lock_files(path) {
                                tracing::error!("Failed to remove lock files: {}", io_err);
                                return Err(e.into());
                            }

                            tracing::info!("Retrying database connection after removing stale locks");
                            let conn = Connection::open(path)?;
                            return Ok(Self::from_connection(conn));
                        }

                        tracing::error!("Process {} is still running, cannot acquire lock", pid);
                    }
                }

                Err(e.into())
            }
        }
    }

    /// Create an in-memory DuckDB storage instance (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

#[async_trait]
impl Storage for DuckDbStorage {
    async fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS event (
                    id UUID PRIMARY KEY,
                    data VARCHAR NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )",
                [],
            )?;

            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_event_created_at ON event(created_at)",
                [],
            )?;

            Ok::<(), StorageError>(())
        })
        .await
        .map_err(join_error)?
    }

    async fn save_record(&self, payload: &str) -> Result<Uuid, StorageError> {
        let conn = self.conn.clone();
        let payload = payload.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let id = Uuid::new_v4();

            conn.execute(
                "INSERT INTO event (id, data, created_at) VALUES (?, ?, to_timestamp(? / 1000000.0))",
                duckdb::params![id.to_string(), payload, Utc::now().timestamp_micros()],
            )?;

            Ok::<Uuid, StorageError>(id)
        })
        .await
        .map_err(join_error)?
    }

    async fn list_records(&self) -> Result<Vec<PersistedRecord>, StorageError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT CAST(id AS VARCHAR), data, epoch_us(created_at)
                 FROM event
                 ORDER BY created_at",
            )?;

            let rows = stmt.query_map([], |row| {
                Ok(PersistedRecord {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).map_err(|e| {
                        duckdb::Error::FromSqlConversionFailure(
                            0,
                            duckdb::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    data: row.get(1)?,
                    created_at: DateTime::from_timestamp_micros(row.get::<_, i64>(2)?)
                        .ok_or_else(|| {
                            duckdb::Error::FromSqlConversionFailure(
                                2,
                                duckdb::types::Type::BigInt,
                                Box::new(std::io::Error::new(
                                    std::io::ErrorKind::InvalidData,
                                    "invalid timestamp",
                                )),
                            )
                        })?,
                })
            })?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok::<Vec<PersistedRecord>, StorageError>(records)
        })
        .await
        .map_err(join_error)?
    }

    async fn probe(&self) -> bool {
        let conn = self.conn.clone();

        let result = tokio::task::spawn_blocking(move || {
            // A fresh handle on the same database proves it can still hand out connections
            let fresh = lock(&conn)?.try_clone()?;
            let one: i32 = fresh.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok::<bool, StorageError>(one == 1)
        })
        .await;

        match result {
            Ok(Ok(available)) => available,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Storage probe failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Storage probe task failed");
                false
            }
        }
    }
}
