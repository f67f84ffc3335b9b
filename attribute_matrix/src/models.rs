//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`] for use with Diesel’s Queryable/Insertable APIs:
//! - [`crate::schema::matrix_entry`]: one row per product per valid combination,
//!   carrying asset status and upload metadata
//!
//! Catalog tables (products, attributes, sub-attributes, rules) live in
//! [`catalog`]. See migrations for constraints and triggers (e.g., the
//! `updated_at` trigger on `matrix_entry` and the status/handle CHECK).

pub mod catalog;

use diesel::prelude::*;

use crate::schema::*;

/// A row in [`crate::schema::matrix_entry`]: one combination of one product.
///
/// `attribute_combination` and `attribute_labels` hold JSON objects keyed by
/// attribute id; use [`crate::matrix::MatrixEntry`] for the decoded form.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = matrix_entry, check_for_backend(diesel::sqlite::Sqlite))]
pub struct MatrixEntryRow {
    /// Database primary key (SQLite rowid).
    pub id: i32,
    /// Owning product id.
    pub product_id: String,
    /// Canonical key of the combination (see [`crate::key`]).
    pub combination_key: String,
    /// JSON object: attribute id -> selected value. Authoritative for matching.
    pub attribute_combination: String,
    /// JSON object: attribute id -> display labels.
    pub attribute_labels: String,
    /// "missing" | "uploaded".
    pub status: String,
    /// Generation order of the combination.
    pub sort_order: i32,
    /// Public URL of the attached image; NULL while missing.
    pub image_url: Option<String>,
    /// Public URL of the thumbnail; NULL while missing.
    pub thumbnail_url: Option<String>,
    /// Blob store handle; NULL while missing.
    pub storage_handle: Option<String>,
    /// Client-supplied file name of the upload.
    pub original_filename: Option<String>,
    /// Upload size in bytes.
    pub file_size: Option<i64>,
    /// Upload timestamp in RFC3339 UTC.
    pub uploaded_at: Option<String>,
    /// Compare-and-set counter for asset attach/clear.
    pub asset_version: i32,
    /// Row creation timestamp in RFC3339 UTC.
    pub created_at: String,
    /// Row update timestamp in RFC3339 UTC (maintained by trigger on UPDATE).
    pub updated_at: String,
}

/// Insertable form of [`MatrixEntryRow`]. Every new entry starts out missing.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = matrix_entry)]
pub struct NewMatrixEntry<'a> {
    /// Owning product id.
    pub product_id: &'a str,
    /// Canonical key.
    pub combination_key: &'a str,
    /// JSON assignment.
    pub attribute_combination: &'a str,
    /// JSON labels.
    pub attribute_labels: &'a str,
    /// Always "missing" on insert.
    pub status: &'a str,
    /// Generation order.
    pub sort_order: i32,
}

/// Display metadata refreshed on every regeneration.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = matrix_entry)]
pub struct MatrixEntryRefresh<'a> {
    /// JSON labels.
    pub attribute_labels: &'a str,
    /// Generation order.
    pub sort_order: i32,
}

/// Asset columns written together by attach and clear.
///
/// `None` writes NULL, so clearing resets every field in one statement.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = matrix_entry, treat_none_as_null = true)]
pub struct AssetChangeset<'a> {
    /// "missing" | "uploaded".
    pub status: &'a str,
    /// Public URL.
    pub image_url: Option<&'a str>,
    /// Thumbnail URL.
    pub thumbnail_url: Option<&'a str>,
    /// Blob handle.
    pub storage_handle: Option<&'a str>,
    /// Upload file name.
    pub original_filename: Option<&'a str>,
    /// Upload size in bytes.
    pub file_size: Option<i64>,
    /// Upload timestamp (RFC3339 UTC).
    pub uploaded_at: Option<&'a str>,
    /// Next compare-and-set version.
    pub asset_version: i32,
}
