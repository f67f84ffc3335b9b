#![allow(dead_code)]

use attribute_matrix::catalog::config::load_catalog_str;
use attribute_matrix::catalog::sync::{CatalogDiff, SyncOptions, sync_catalog};
use attribute_matrix::db::{connection, migrate};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Cnt {
    #[diesel(sql_type = BigInt)]
    n: i64,
}
#[derive(QueryableByName)]
struct FkViolation {
    #[diesel(sql_type = Text)]
    table: String,
}

/// Paper x UV card. "Spot UV" expands into two sub-attributes; 300gsm hides UV.
pub const CARDS_TOML: &str = r#"
[attributes.paper]
name = "Paper"
values = [
  { value = "300", label = "300gsm" },
  { value = "350", label = "350gsm" },
  { value = "400", label = "400gsm" },
]

[attributes.uv]
name = "UV"
input_type = "radio"
values = [{ value = "None" }, { value = "Spot UV", has_sub_attributes = true }]
sub_attributes = [
  { parent_value = "Spot UV", value = "Logo" },
  { parent_value = "Spot UV", value = "Full" },
]

[products.card]
name = "Business card"
category = "cards"
attributes = ["paper", "uv"]

[[rules]]
id = "no-uv-on-300"
name = "300gsm cannot take UV"
when = { attribute = "paper", value = "300" }
actions = [{ type = "hide", target = "uv" }]
"#;

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");

    // open a connection with PRAGMAs applied
    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

/// Sync a TOML catalog with default options.
pub fn sync_toml(conn: &mut SqliteConnection, toml_str: &str) -> CatalogDiff {
    let cat = load_catalog_str(toml_str).expect("catalog parses");
    sync_catalog(conn, cat, SyncOptions::default()).expect("sync")
}

/// Fresh database with [`CARDS_TOML`] synced.
pub fn setup_cards() -> (TestDb, SqliteConnection) {
    let (db, mut conn) = setup_db();
    sync_toml(&mut conn, CARDS_TOML);
    (db, conn)
}

pub fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    let c: Cnt = diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table};"))
        .get_result(conn)
        .unwrap();
    c.n
}

pub fn fk_check_empty(conn: &mut SqliteConnection) {
    let v: Vec<FkViolation> = diesel::sql_query("PRAGMA foreign_key_check;")
        .load(conn)
        .unwrap();
    assert!(
        v.is_empty(),
        "foreign key violations in: {:?}",
        v.iter().map(|r| r.table.as_str()).collect::<Vec<_>>()
    );
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}
