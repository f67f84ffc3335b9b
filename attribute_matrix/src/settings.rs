//! Runtime settings.
//!
//! Read from an optional TOML file, then overridden from the environment:
//! - `ATTRIBUTE_MATRIX_CONFIG`: path of the settings file
//! - `DATABASE_URL`: SQLite path or `sqlite://` URL
//! - `ATTRIBUTE_MATRIX_BLOB_DIR`: directory for [`crate::blob::FsBlobStore`]
//!
//! ```toml
//! database_url = "matrix.db"
//! blob_dir = "blobs"
//! blob_base_url = "https://cdn.example.com/matrix"
//! combination_warn_threshold = 200
//! upsert_batch_size = 100
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

/// Env var naming the settings file.
pub const CONFIG_ENV: &str = "ATTRIBUTE_MATRIX_CONFIG";
/// Env var overriding [`Settings::database_url`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Env var overriding [`Settings::blob_dir`].
pub const BLOB_DIR_ENV: &str = "ATTRIBUTE_MATRIX_BLOB_DIR";

/// A setting required by the operation is not set.
#[derive(Debug, Error)]
#[error("missing setting '{0}' (set it in the config file or via {1})")]
pub struct MissingSettingError(pub &'static str, pub &'static str);

fn default_blob_dir() -> PathBuf {
    PathBuf::from("blobs")
}

fn default_blob_base_url() -> String {
    "file://blobs".to_string()
}

fn default_warn_threshold() -> usize {
    200
}

fn default_batch_size() -> usize {
    100
}

/// All runtime knobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// SQLite database; required by every command that touches storage.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Root of the filesystem blob store.
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,
    /// Public URL prefix of `blob_dir`.
    #[serde(default = "default_blob_base_url")]
    pub blob_base_url: String,
    /// Generation above this many combinations logs a warning. Not a cap.
    #[serde(default = "default_warn_threshold")]
    pub combination_warn_threshold: usize,
    /// Rows per reconcile savepoint.
    #[serde(default = "default_batch_size")]
    pub upsert_batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            blob_dir: default_blob_dir(),
            blob_base_url: default_blob_base_url(),
            combination_warn_threshold: default_warn_threshold(),
            upsert_batch_size: default_batch_size(),
        }
    }
}

impl Settings {
    /// Parse settings TOML.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("failed to parse settings TOML")
    }

    /// Read and parse a settings file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("read settings file {}", path.as_ref().display()))?;
        Self::from_toml_str(&text)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(dir) = lookup(BLOB_DIR_ENV).filter(|v| !v.is_empty()) {
            self.blob_dir = PathBuf::from(dir);
        }
        self
    }

    /// File named by `ATTRIBUTE_MATRIX_CONFIG` (if any) plus env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let env = |k: &str| std::env::var(k).ok();
        let base = match env(CONFIG_ENV) {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        Ok(base.apply_overrides(env))
    }

    /// The database URL or a [`MissingSettingError`].
    pub fn require_database_url(&self) -> Result<&str, MissingSettingError> {
        self.database_url
            .as_deref()
            .ok_or(MissingSettingError("database_url", DATABASE_URL_ENV))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_fill_missing_fields() {
        let s = Settings::from_toml_str("database_url = \"matrix.db\"").unwrap();
        assert_eq!(s.database_url.as_deref(), Some("matrix.db"));
        assert_eq!(s.combination_warn_threshold, 200);
        assert_eq!(s.upsert_batch_size, 100);
        assert_eq!(s.blob_dir, PathBuf::from("blobs"));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> =
            HashMap::from([(DATABASE_URL_ENV, "sqlite://other.db"), (BLOB_DIR_ENV, "/tmp/b")]);
        let s = Settings::from_toml_str("database_url = \"matrix.db\"")
            .unwrap()
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.database_url.as_deref(), Some("sqlite://other.db"));
        assert_eq!(s.blob_dir, PathBuf::from("/tmp/b"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::from_toml_str("databse_url = \"typo.db\"").is_err());
    }

    #[test]
    fn missing_database_url_names_the_env_var() {
        let err = Settings::default().require_database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = dir.path().join("settings.toml");
        std::fs::write(&p, "upsert_batch_size = 7\n").unwrap();
        assert_eq!(Settings::from_path(&p).unwrap().upsert_batch_size, 7);
    }
}
