//! Connection setup shared by the server, the CLI and tests.
//!
//! # Invariants
//! - Every connection enforces foreign keys and waits on locks for
//!   `BUSY_TIMEOUT` before failing.
//! - File databases run in WAL mode so per-request connections can read
//!   while another request writes.

use super::migrations::{apply_migrations, MigrationReport};
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    File,
    Memory,
}

impl Storage {
    fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens (creating if needed) the database at `path` with the schema
/// migrated to the latest version.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    connect(Storage::File, || Connection::open(path))
}

/// Private in-memory database, mostly for tests.
pub fn open_db_in_memory() -> DbResult<Connection> {
    connect(Storage::Memory, Connection::open_in_memory)
}

fn connect(
    storage: Storage,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let prepared = open()
        .map_err(DbError::from)
        .and_then(|mut conn| prepare(&mut conn, storage).map(|report| (conn, report)));

    match prepared {
        Ok((conn, report)) => {
            info!(
                "event=db_open module=db status=ok storage={} schema_from={} schema_to={} duration_ms={}",
                storage.label(),
                report.from,
                report.to,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error storage={} duration_ms={} error={}",
                storage.label(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn prepare(conn: &mut Connection, storage: Storage) -> DbResult<MigrationReport> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if storage == Storage::File {
        // journal_mode answers with the resulting mode, so it is read back as a query.
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    }
    apply_migrations(conn)
}

#[cfg(test)]
mod tests {
    use super::open_db;

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("jigyasa.sqlite3");

        let conn = open_db(&path).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
        assert!(path.exists());
    }
}
