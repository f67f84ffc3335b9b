//! SQLite connection helpers.
//!
//! Provides [`connect_sqlite`] that opens a connection and applies the PRAGMAs
//! every caller relies on: WAL journaling, foreign_keys=ON (the matrix and
//! catalog FKs are only enforced with it), and a 5000ms busy_timeout.
//!
//! Example:
//! ```no_run
//! use attribute_matrix::db::connection::connect_sqlite;
//!
//! let path = std::env::temp_dir().join("attribute_matrix_example.db");
//! let _conn = connect_sqlite(path.to_str().unwrap()).expect("open sqlite");
//! ```

use anyhow::Context;
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};

/// Accepts a bare path, `sqlite:path` or `sqlite://path`; returns the path.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let path = sqlite_path(database_url);
    let mut conn = SqliteConnection::establish(path)
        .with_context(|| format!("open sqlite database {path}"))?;

    conn.batch_execute(
        "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
    )?;
    Ok(conn)
}
