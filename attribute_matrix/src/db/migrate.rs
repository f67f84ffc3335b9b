//! set up migrations

use anyhow::anyhow;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use crate::db::connection::connect_sqlite;

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by [`run_sqlite`] to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on a SQLite database.
///
/// `database_url` may be a bare path or a `sqlite:`/`sqlite://` URL. Returns the
/// versions that were applied.
pub fn run_sqlite(database_url: &str) -> anyhow::Result<Vec<String>> {
    let mut conn = connect_sqlite(database_url)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>();

    info!(count = applied.len(), versions = ?applied, "migrations applied");
    Ok(applied)
}

#[cfg(test)]
mod test {
    use super::*;
    use diesel::{Connection, SqliteConnection, connection::SimpleConnection};

    #[test]
    fn migrations_apply_on_temp_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let path = temp.path().to_string_lossy().to_string();

        let applied = run_sqlite(&path).expect("migration run");
        assert_eq!(applied.len(), 2);
        assert!(run_sqlite(&format!("sqlite://{path}")).unwrap().is_empty());

        let mut conn = SqliteConnection::establish(&path).unwrap();
        conn.batch_execute(
            "INSERT INTO product (id, name) VALUES ('card', 'Business card')",
        )
        .unwrap();
    }
}
