//! Admin operations over one SQLite connection.
//!
//! Each call loads what it needs, does its work and returns; nothing is kept
//! between calls. Errors travel as `anyhow::Error` with a [`MatrixError`]
//! inside for the cases callers are expected to branch on.

use std::collections::HashSet;

use anyhow::Context;
use diesel::SqliteConnection;
use serde::Serialize;
use tracing::{info, warn};

use crate::blob::{BlobError, BlobStore};
use crate::catalog::{CatalogSource, SqliteCatalog};
use crate::engine::GenerationContext;
use crate::engine::expand::SubAttributeIndex;
use crate::engine::generate::{Combination, GenerationReport};
use crate::error::{MatrixError, RecordKind};
use crate::key::Assignment;
use crate::matrix::{
    AssetMetadata, MatrixEntry, MatrixRepo, ReconcileOptions, RepoError, SqliteMatrixRepo,
};
use crate::resolve::{self, Resolution};
use crate::settings::Settings;

/// Knobs for [`AdminService::generate`] and [`AdminService::preview`].
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Allow running against a product that already has entries.
    pub regenerate: bool,
    /// Expand values into their sub-attributes.
    pub include_sub_attributes: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            regenerate: false,
            include_sub_attributes: true,
        }
    }
}

/// Service-level limits taken from [`Settings`].
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Combination count above which a warning is emitted.
    pub combination_warn_threshold: usize,
    /// Rows per reconcile savepoint.
    pub upsert_batch_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        let s = Settings::default();
        Self::from(&s)
    }
}

impl From<&Settings> for Limits {
    fn from(s: &Settings) -> Self {
        Self {
            combination_warn_threshold: s.combination_warn_threshold,
            upsert_batch_size: s.upsert_batch_size,
        }
    }
}

/// Outcome of [`AdminService::generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateSummary {
    /// Eligible attributes walked.
    pub attribute_count: usize,
    /// Valid combinations produced.
    pub total_combinations: usize,
    /// Entries inserted.
    pub created: usize,
    /// Entries that already existed.
    pub existing: usize,
    /// Stale MISSING entries removed.
    pub pruned: usize,
    /// Advisory messages.
    pub warnings: Vec<String>,
}

/// Outcome of [`AdminService::preview`].
#[derive(Debug, Clone)]
pub struct Preview {
    /// Eligible attributes walked.
    pub attribute_count: usize,
    /// Valid combinations produced.
    pub total_combinations: usize,
    /// Entries currently stored for the product.
    pub existing_entries: i64,
    /// Combinations if no rule pruned anything.
    pub cartesian_upper_bound: u128,
    /// Advisory messages.
    pub warnings: Vec<String>,
    /// The combinations themselves, in emission order.
    pub combinations: Vec<Combination>,
    /// What pruning did.
    pub report: GenerationReport,
}

/// Outcome of [`AdminService::attach_asset`].
#[derive(Debug, Clone)]
pub struct AttachOutcome {
    /// Entry after the attach.
    pub entry: MatrixEntry,
    /// Handle of the image this one replaced, already released.
    pub replaced_handle: Option<String>,
}

struct Loaded {
    attribute_count: usize,
    context: GenerationContext,
}

/// Admin operations over a catalog reader, a matrix repository and a blob store.
pub struct AdminService<B, C = SqliteCatalog, R = SqliteMatrixRepo> {
    catalog: C,
    repo: R,
    blob: B,
    limits: Limits,
}

impl<B: BlobStore> AdminService<B> {
    /// SQLite-backed service.
    pub fn new(blob: B, limits: Limits) -> Self {
        Self::with_parts(SqliteCatalog::new(), SqliteMatrixRepo::new(), blob, limits)
    }
}

impl<B: BlobStore, C: CatalogSource, R: MatrixRepo> AdminService<B, C, R> {
    /// Service over explicit parts.
    pub fn with_parts(catalog: C, repo: R, blob: B, limits: Limits) -> Self {
        Self {
            catalog,
            repo,
            blob,
            limits,
        }
    }

    /// The blob store.
    pub fn blob(&self) -> &B {
        &self.blob
    }

    fn load(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        opts: GenerateOptions,
    ) -> anyhow::Result<Loaded> {
        if product_id.trim().is_empty() {
            return Err(MatrixError::validation("product id is required").into());
        }
        let product = self
            .catalog
            .product(conn, product_id)?
            .ok_or_else(|| MatrixError::not_found(RecordKind::Product, product_id))?;

        let attributes = self.catalog.list_eligible_attributes(conn, product_id)?;
        if attributes.is_empty() {
            return Err(MatrixError::validation(format!(
                "product '{product_id}' has no selection attributes with values"
            ))
            .into());
        }

        let mut subs = Vec::new();
        if opts.include_sub_attributes {
            for a in &attributes {
                subs.extend(self.catalog.list_sub_attributes(conn, &a.id)?);
            }
        }
        let index = SubAttributeIndex::new(subs);
        let rules = self.catalog.list_applicable_rules(conn, &product)?;

        Ok(Loaded {
            attribute_count: attributes.len(),
            context: GenerationContext::new(
                &attributes,
                &index,
                rules,
                opts.include_sub_attributes,
            ),
        })
    }

    fn run(
        &self,
        product_id: &str,
        loaded: &Loaded,
    ) -> anyhow::Result<(Vec<Combination>, GenerationReport, Vec<String>)> {
        let generated = loaded.context.generate();
        if generated.combinations.is_empty() {
            return Err(MatrixError::validation(format!(
                "rules leave zero valid combinations for product '{product_id}': {}",
                generated.report.describe_empty_paths()
            ))
            .into());
        }

        let mut warnings = Vec::new();
        let total = generated.combinations.len();
        if total > self.limits.combination_warn_threshold {
            warn!(
                product = product_id,
                total,
                threshold = self.limits.combination_warn_threshold,
                "combination count above warning threshold"
            );
            warnings.push(format!(
                "{total} combinations exceeds the warning threshold of {}",
                self.limits.combination_warn_threshold
            ));
        }
        Ok((generated.combinations, generated.report, warnings))
    }

    /// Enumerate and persist the valid combinations of a product.
    ///
    /// Without `regenerate`, a product that already has entries is a
    /// [`MatrixError::Conflict`]. With it, stale MISSING entries are pruned
    /// and UPLOADED entries are always kept.
    pub fn generate(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        opts: GenerateOptions,
    ) -> anyhow::Result<GenerateSummary> {
        let loaded = self.load(conn, product_id, opts)?;
        let (combinations, _report, mut warnings) = self.run(product_id, &loaded)?;

        // Fails fast before the orphan scan; reconcile re-checks under the lock.
        let existing = self.repo.count_for_product(conn, product_id)?;
        if existing > 0 && !opts.regenerate {
            return Err(MatrixError::conflict(format!(
                "product '{product_id}' already has {existing} matrix entries; \
                 pass regenerate to update them"
            ))
            .into());
        }

        if opts.regenerate {
            let fresh: HashSet<&str> = combinations.iter().map(|c| c.key.as_str()).collect();
            let orphaned = self
                .repo
                .list_uploaded(conn, product_id)?
                .iter()
                .filter(|e| !fresh.contains(e.key.as_str()))
                .count();
            if orphaned > 0 {
                warnings.push(format!(
                    "{orphaned} uploaded entries are no longer generated and were kept"
                ));
            }
        }

        let report = self.repo.reconcile(
            conn,
            product_id,
            &combinations,
            ReconcileOptions {
                keep_uploaded: opts.regenerate,
                require_empty: !opts.regenerate,
                batch_size: self.limits.upsert_batch_size,
            },
        )?;

        let summary = GenerateSummary {
            attribute_count: loaded.attribute_count,
            total_combinations: combinations.len(),
            created: report.created,
            existing: report.existing,
            pruned: report.pruned,
            warnings,
        };
        info!(
            product = product_id,
            attributes = summary.attribute_count,
            total = summary.total_combinations,
            created = summary.created,
            existing = summary.existing,
            pruned = summary.pruned,
            "matrix generated"
        );
        Ok(summary)
    }

    /// Same as [`Self::generate`] without persisting anything.
    pub fn preview(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        opts: GenerateOptions,
    ) -> anyhow::Result<Preview> {
        let loaded = self.load(conn, product_id, opts)?;
        let (combinations, report, warnings) = self.run(product_id, &loaded)?;
        Ok(Preview {
            attribute_count: loaded.attribute_count,
            total_combinations: combinations.len(),
            existing_entries: self.repo.count_for_product(conn, product_id)?,
            cartesian_upper_bound: loaded.context.cartesian_upper_bound(),
            warnings,
            combinations,
            report,
        })
    }

    /// Image for a live selection; see [`crate::resolve`].
    pub fn resolve(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        selection: &Assignment,
    ) -> anyhow::Result<Option<Resolution>> {
        if product_id.trim().is_empty() {
            return Err(MatrixError::validation("product id is required").into());
        }
        resolve::resolve(&self.repo, conn, product_id, selection)
    }

    /// Entries of a product by sort order.
    pub fn list_entries(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> anyhow::Result<Vec<MatrixEntry>> {
        self.repo.list_entries(conn, product_id)
    }

    fn entry(&self, conn: &mut SqliteConnection, entry_id: i32) -> anyhow::Result<MatrixEntry> {
        self.repo
            .get_entry(conn, entry_id)?
            .ok_or_else(|| MatrixError::not_found(RecordKind::Entry, entry_id.to_string()).into())
    }

    /// Delete a blob; failures are logged and swallowed.
    fn release(&self, handle: &str) {
        match self.blob.delete(handle) {
            Ok(()) => {}
            Err(BlobError::NotFound(_)) => {
                warn!(handle, "released blob was already gone");
            }
            Err(e) => {
                warn!(handle, error = %e, "failed to release blob; it is now orphaned");
            }
        }
    }

    /// Upload `bytes` and attach them to an entry.
    ///
    /// An upload failure leaves the entry untouched. A lost compare-and-set
    /// race deletes the new upload and returns [`MatrixError::Conflict`]. The
    /// replaced image, if any, is released after the entry is updated.
    pub fn attach_asset(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
        bytes: &[u8],
        filename: &str,
    ) -> anyhow::Result<AttachOutcome> {
        if bytes.is_empty() {
            return Err(MatrixError::validation("upload is empty").into());
        }
        let file_size = i64::try_from(bytes.len()).context("upload too large")?;
        let current = self.entry(conn, entry_id)?;

        let stored = self.blob.put(bytes, filename).map_err(MatrixError::from)?;
        let meta = AssetMetadata {
            original_filename: filename.to_string(),
            file_size,
        };

        let replaced = match self
            .repo
            .attach_asset(conn, entry_id, &stored, &meta, current.asset_version)
        {
            Ok(prev) => prev,
            Err(e) => {
                self.release(&stored.handle);
                return Err(match e.downcast_ref::<RepoError>() {
                    Some(RepoError::AssetVersionConflict { .. }) => MatrixError::conflict(format!(
                        "matrix entry {entry_id} changed while uploading; retry"
                    ))
                    .into(),
                    _ => e,
                });
            }
        };

        if let Some(handle) = &replaced {
            self.release(handle);
        }
        let entry = self.entry(conn, entry_id)?;
        info!(entry = entry_id, handle = %stored.handle, replaced = ?replaced, "asset attached");
        Ok(AttachOutcome {
            entry,
            replaced_handle: replaced,
        })
    }

    /// Detach the image of an entry; the entry stays, as MISSING.
    /// Clearing an entry that has no image is a no-op.
    pub fn clear_asset(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
    ) -> anyhow::Result<MatrixEntry> {
        let current = self.entry(conn, entry_id)?;
        let released = self
            .repo
            .clear_asset(conn, entry_id, current.asset_version)
            .map_err(|e| match e.downcast_ref::<RepoError>() {
                Some(RepoError::AssetVersionConflict { .. }) => MatrixError::conflict(format!(
                    "matrix entry {entry_id} changed concurrently; retry"
                ))
                .into(),
                _ => e,
            })?;
        if let Some(handle) = &released {
            self.release(handle);
            info!(entry = entry_id, handle = %handle, "asset cleared");
        }
        self.entry(conn, entry_id)
    }

    /// Delete one entry and release its image.
    pub fn delete_entry(&self, conn: &mut SqliteConnection, entry_id: i32) -> anyhow::Result<()> {
        if let Some(handle) = self.repo.delete_entry(conn, entry_id)? {
            self.release(&handle);
        }
        info!(entry = entry_id, "matrix entry deleted");
        Ok(())
    }

    /// Delete every entry of a product and release their images. Returns the
    /// number of entries deleted.
    pub fn clear_all_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> anyhow::Result<usize> {
        if product_id.trim().is_empty() {
            return Err(MatrixError::validation("product id is required").into());
        }
        let report = self.repo.clear_all_for_product(conn, product_id)?;
        for handle in &report.released_handles {
            self.release(handle);
        }
        info!(
            product = product_id,
            deleted = report.deleted,
            released = report.released_handles.len(),
            "matrix cleared"
        );
        Ok(report.deleted)
    }
}
