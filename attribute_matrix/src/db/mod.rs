//! Database utilities for connections and schema migrations.
//!
//! This module provides:
//! - SQLite connection helpers: [`connection::connect_sqlite`] applies WAL,
//!   foreign_keys=ON, and a 5000ms busy_timeout.
//! - Embedded Diesel migrations: [`migrate::run_sqlite`], which accepts a bare file
//!   path or a `sqlite:`/`sqlite://` URL.
//!
//! Example:
//! ```no_run
//! use attribute_matrix::db::{migrate, connection};
//!
//! let db_path = std::env::temp_dir().join("attribute_matrix_example.db");
//! migrate::run_sqlite(db_path.to_str().unwrap()).expect("migrations");
//!
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;
