//! Combination matrix store (SQLite).
//!
//! One row per product per valid combination. Rows are created MISSING by
//! [`MatrixRepo::reconcile`], move to UPLOADED on [`MatrixRepo::attach_asset`]
//! and back on [`MatrixRepo::clear_asset`]. Regeneration never deletes an
//! UPLOADED row; only explicit deletion does.
use std::{fmt, str::FromStr};

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use serde::Serialize;

use crate::blob::StoredAsset;
use crate::engine::generate::{Combination, LabelMap};
use crate::key::{Assignment, CombinationKey};
use crate::models::MatrixEntryRow;
use crate::timestamp::parse_ts_to_utc;

pub mod repo;

pub use repo::SqliteMatrixRepo;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors that can occur while interacting with the matrix repository.
pub enum RepoError {
    #[error("asset version conflict on entry {entry_id} (expected {expected})")]
    /// Raised when the entry's `asset_version` moved since it was read.
    AssetVersionConflict {
        /// Entry id.
        entry_id: i32,
        /// The version the caller read.
        expected: i32,
    },
    #[error("upsert batch {index} failed after retry")]
    /// Raised when a reconcile batch fails twice.
    BatchFailed {
        /// Zero-based batch index.
        index: usize,
    },
}

/// Result type used throughout the matrix repository for fallible operations.
pub type RepoResult<T> = anyhow::Result<T>;

/// Asset state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// No image attached.
    Missing,
    /// Image attached.
    Uploaded,
}

impl EntryStatus {
    /// Database code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Uploaded => "uploaded",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "missing" => Self::Missing,
            "uploaded" => Self::Uploaded,
            other => bail!("unknown entry status '{other}'"),
        })
    }
}

/// Decoded matrix entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixEntry {
    /// Database id.
    pub id: i32,
    /// Owning product.
    pub product_id: String,
    /// Canonical key.
    pub key: CombinationKey,
    /// Attribute id -> value. Authoritative for matching.
    pub assignment: Assignment,
    /// Attribute id -> labels.
    pub labels: LabelMap,
    /// Asset state.
    pub status: EntryStatus,
    /// Generation order.
    pub sort_order: i32,
    /// Image URL.
    pub image_url: Option<String>,
    /// Thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// Blob handle.
    pub storage_handle: Option<String>,
    /// Upload file name.
    pub original_filename: Option<String>,
    /// Upload size in bytes.
    pub file_size: Option<i64>,
    /// Upload time.
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Compare-and-set counter; pass it back to attach/clear.
    pub asset_version: i32,
}

impl TryFrom<MatrixEntryRow> for MatrixEntry {
    type Error = anyhow::Error;

    fn try_from(row: MatrixEntryRow) -> Result<Self, Self::Error> {
        let ctx = || format!("matrix entry {}", row.id);
        let key = CombinationKey::parse(row.combination_key.clone()).with_context(ctx)?;
        let assignment: Assignment =
            serde_json::from_str(&row.attribute_combination).with_context(ctx)?;
        let labels: LabelMap = serde_json::from_str(&row.attribute_labels).with_context(ctx)?;
        let uploaded_at = row
            .uploaded_at
            .as_deref()
            .map(parse_ts_to_utc)
            .transpose()
            .with_context(ctx)?;
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            key,
            assignment,
            labels,
            status: row.status.parse()?,
            sort_order: row.sort_order,
            image_url: row.image_url,
            thumbnail_url: row.thumbnail_url,
            storage_handle: row.storage_handle,
            original_filename: row.original_filename,
            file_size: row.file_size,
            uploaded_at,
            asset_version: row.asset_version,
        })
    }
}

/// Reconciliation knobs.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Regeneration: drop MISSING entries whose key is no longer generated.
    /// UPLOADED entries always survive.
    pub keep_uploaded: bool,
    /// Refuse with [`MatrixError::Conflict`](crate::error::MatrixError::Conflict)
    /// when the product already has entries. Checked under the write lock.
    pub require_empty: bool,
    /// Rows per savepoint.
    pub batch_size: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            keep_uploaded: false,
            require_empty: false,
            batch_size: 100,
        }
    }
}

/// Aggregate counts of one reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Entries inserted.
    pub created: usize,
    /// Entries that already existed (labels and order refreshed).
    pub existing: usize,
    /// Stale MISSING entries removed.
    pub pruned: usize,
}

/// Client-side facts about an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    /// File name as supplied.
    pub original_filename: String,
    /// Size in bytes.
    pub file_size: i64,
}

/// Result of deleting every entry of a product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearAllReport {
    /// Rows deleted.
    pub deleted: usize,
    /// Blob handles that were attached to deleted rows.
    pub released_handles: Vec<String>,
}

/// Portable surface, SQLite implementation lives in `repo.rs`.
pub trait MatrixRepo {
    /// Persist `combinations` for a product; see [`ReconcileOptions`].
    fn reconcile(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        combinations: &[Combination],
        opts: ReconcileOptions,
    ) -> RepoResult<ReconcileReport>;

    /// One entry by id.
    fn get_entry(&self, conn: &mut SqliteConnection, entry_id: i32)
    -> RepoResult<Option<MatrixEntry>>;

    /// Every entry of a product by sort order.
    fn list_entries(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> RepoResult<Vec<MatrixEntry>>;

    /// Number of entries of a product.
    fn count_for_product(&self, conn: &mut SqliteConnection, product_id: &str) -> RepoResult<i64>;

    /// UPLOADED entry with exactly this key.
    fn find_uploaded_by_key(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        key: &CombinationKey,
    ) -> RepoResult<Option<MatrixEntry>>;

    /// Every UPLOADED entry of a product by sort order, then id.
    fn list_uploaded(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> RepoResult<Vec<MatrixEntry>>;

    /// Set the asset fields if `asset_version == expected_version`.
    /// Returns the handle this replaced, if any.
    fn attach_asset(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
        stored: &StoredAsset,
        meta: &AssetMetadata,
        expected_version: i32,
    ) -> RepoResult<Option<String>>;

    /// Reset to MISSING if `asset_version == expected_version`.
    /// Returns the released handle; `None` if nothing was attached.
    fn clear_asset(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
        expected_version: i32,
    ) -> RepoResult<Option<String>>;

    /// Delete one entry. Returns its handle, if any.
    fn delete_entry(&self, conn: &mut SqliteConnection, entry_id: i32)
    -> RepoResult<Option<String>>;

    /// Delete every entry of a product.
    fn clear_all_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> RepoResult<ClearAllReport>;
}
