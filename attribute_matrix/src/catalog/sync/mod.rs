//! Catalog synchronization (products, attributes, values, sub-attributes, rules).
//!
//! ## What this does
//! - Takes a [`Catalog`] (TOML) and **normalizes** it (lowercase ids, trim, dedupe,
//!   dangling references rejected).
//! - Computes a **diff** between TOML (desired) and the DB (current). Only rows
//!   that are absent or differ are upserted, so a second sync of the same file
//!   is a no-op.
//! - Applies the diff with UPSERTs (idempotent) and optional **prune** deletes.
//!
//! ## Transactions & consistency
//! Everything runs inside a single **`BEGIN IMMEDIATE`** transaction via
//! `SqliteConnection::immediate_transaction`. We either apply the whole diff or none of it.
//!
//! ## Dry-run
//! When `SyncOptions::dry_run` is `true`, the diff is computed and returned but
//! nothing is written.
//!
//! ## Delete order (prune)
//! `rule` → `sub_attribute` → `product_attribute` → `attribute_value` →
//! (`attribute`, `product`). Products with matrix entries are protected by
//! `ON DELETE RESTRICT`; pruning one fails the whole sync.

mod apply;
mod diff;
mod read;
mod want;

use anyhow::Context;
use diesel::SqliteConnection;
use diesel::prelude::*;
use std::collections::BTreeMap;
use tracing::info;

use crate::catalog::config::{Catalog, normalize_catalog};

pub use diff::CatalogDiff;

/// Options for catalog synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// If true, compute the diff only.
    pub dry_run: bool,
    /// If true, delete rows from the DB that are not present in the TOML.
    pub prune: bool,
}

/// Stored columns of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    /// Display name.
    pub name: String,
    /// Category id.
    pub category: Option<String>,
}

/// Stored columns of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    /// Display name.
    pub name: String,
    /// Input type code.
    pub input_type: String,
}

/// Stored columns of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    /// Display label.
    pub label: String,
    /// Advisory UI hint.
    pub has_sub_attributes: bool,
    /// Position within the attribute.
    pub position: i32,
}

/// Stored columns of a sub-attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAttributeRecord {
    /// Display label.
    pub label: String,
    /// Enabled flag.
    pub enabled: bool,
    /// Position under the parent value.
    pub position: i32,
}

/// Stored columns of a rule; `actions` is the JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRecord {
    /// Display name.
    pub name: String,
    /// Priority.
    pub priority: i32,
    /// Active flag.
    pub active: bool,
    /// Scope code.
    pub scope: String,
    /// Category or product id for scoped rules.
    pub scope_ref: Option<String>,
    /// Condition attribute.
    pub when_attribute_id: String,
    /// Condition value.
    pub when_value: String,
    /// JSON array of actions.
    pub actions: String,
    /// Author order.
    pub seq: i32,
}

/// Whole catalog keyed the way the tables are keyed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// Product id -> columns.
    pub products: BTreeMap<String, ProductRecord>,
    /// Attribute id -> columns.
    pub attributes: BTreeMap<String, AttributeRecord>,
    /// (attribute, value) -> columns.
    pub values: BTreeMap<(String, String), ValueRecord>,
    /// (product, attribute) -> position.
    pub product_attributes: BTreeMap<(String, String), i32>,
    /// (parent attribute, parent value, value) -> columns.
    pub sub_attributes: BTreeMap<(String, String, String), SubAttributeRecord>,
    /// Rule id -> columns.
    pub rules: BTreeMap<String, RuleRecord>,
}

/// Sync the product/attribute/rule catalog into SQLite.
///
/// - Normalizes the [`Catalog`]; normalization errors abort before any write.
/// - UPSERTs only what changed; with `opt.prune`, removes rows not in the TOML.
/// - Returns the diff that was (or, for a dry run, would have been) applied.
pub fn sync_catalog(
    conn: &mut SqliteConnection,
    mut cat: Catalog,
    opt: SyncOptions,
) -> anyhow::Result<CatalogDiff> {
    normalize_catalog(&mut cat).context("catalog normalization failed")?;
    let wanted = want::wanted_from_catalog(&cat)?;

    let diff = conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let current = read::read_current(conn)?;
        let diff = diff::make_diff(&wanted, &current, opt.prune);
        if !opt.dry_run && !diff.is_noop() {
            apply::apply_diff(conn, &diff).context("apply catalog diff")?;
        }
        Ok(diff)
    })?;

    info!(
        dry_run = opt.dry_run,
        prune = opt.prune,
        noop = diff.is_noop(),
        products = cat.products.len(),
        attributes = cat.attributes.len(),
        rules = cat.rules.len(),
        "catalog sync finished"
    );
    Ok(diff)
}
