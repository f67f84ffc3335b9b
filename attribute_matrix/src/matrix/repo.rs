//! SQLite implementation of [`MatrixRepo`](crate::matrix::MatrixRepo).

use std::collections::HashSet;

use anyhow::Context;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    blob::StoredAsset,
    engine::generate::Combination,
    error::{MatrixError, RecordKind},
    key::CombinationKey,
    matrix::{
        AssetMetadata, ClearAllReport, EntryStatus, MatrixEntry, MatrixRepo, ReconcileOptions,
        ReconcileReport, RepoError, RepoResult,
    },
    models::{AssetChangeset, MatrixEntryRefresh, MatrixEntryRow, NewMatrixEntry},
    schema::matrix_entry,
    timestamp::to_rfc3339_millis,
};

use crate::schema::matrix_entry::dsl as me;

/// Combination with its JSON columns pre-encoded, so a retried batch does
/// no serialization work.
struct EncodedRow<'c> {
    key: &'c str,
    combination: String,
    labels: String,
    sort_order: i32,
}

fn encode_rows(combinations: &[Combination]) -> anyhow::Result<Vec<EncodedRow<'_>>> {
    combinations
        .iter()
        .map(|c| {
            Ok(EncodedRow {
                key: c.key.as_str(),
                combination: serde_json::to_string(&c.assignment)
                    .with_context(|| format!("encode assignment of '{}'", c.key))?,
                labels: serde_json::to_string(&c.labels)
                    .with_context(|| format!("encode labels of '{}'", c.key))?,
                sort_order: c.sort_order,
            })
        })
        .collect()
}

/// (created, existing) for one batch, inside a savepoint.
fn upsert_batch(
    conn: &mut SqliteConnection,
    product_id_v: &str,
    rows: &[EncodedRow<'_>],
) -> Result<(usize, usize), diesel::result::Error> {
    conn.transaction(|conn| {
        let (mut created, mut existing) = (0usize, 0usize);
        for r in rows {
            let inserted = diesel::insert_into(matrix_entry::table)
                .values(&NewMatrixEntry {
                    product_id: product_id_v,
                    combination_key: r.key,
                    attribute_combination: &r.combination,
                    attribute_labels: &r.labels,
                    status: EntryStatus::Missing.as_str(),
                    sort_order: r.sort_order,
                })
                .on_conflict((me::product_id, me::combination_key))
                .do_nothing()
                .execute(conn)?;

            if inserted == 1 {
                created += 1;
            } else {
                diesel::update(
                    me::matrix_entry
                        .filter(me::product_id.eq(product_id_v).and(me::combination_key.eq(r.key))),
                )
                .set(&MatrixEntryRefresh {
                    attribute_labels: &r.labels,
                    sort_order: r.sort_order,
                })
                .execute(conn)?;
                existing += 1;
            }
        }
        Ok((created, existing))
    })
}

fn load_one(
    conn: &mut SqliteConnection,
    entry_id: i32,
) -> RepoResult<Option<MatrixEntryRow>> {
    Ok(me::matrix_entry
        .find(entry_id)
        .select(MatrixEntryRow::as_select())
        .first(conn)
        .optional()?)
}

fn count_entries(conn: &mut SqliteConnection, product_id_v: &str) -> RepoResult<i64> {
    Ok(me::matrix_entry
        .filter(me::product_id.eq(product_id_v))
        .count()
        .get_result(conn)?)
}

fn decode_all(rows: Vec<MatrixEntryRow>) -> RepoResult<Vec<MatrixEntry>> {
    rows.into_iter().map(MatrixEntry::try_from).collect()
}

/// Repository for matrix entries in a SQLite database.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteMatrixRepo;

impl SqliteMatrixRepo {
    /// New repository.
    pub fn new() -> Self {
        Self
    }
}

impl MatrixRepo for SqliteMatrixRepo {
    fn reconcile(
        &self,
        conn: &mut SqliteConnection,
        product_id_v: &str,
        combinations: &[Combination],
        opts: ReconcileOptions,
    ) -> RepoResult<ReconcileReport> {
        let rows = encode_rows(combinations)?;
        let batch_size = opts.batch_size.max(1);

        let report = conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            let mut report = ReconcileReport::default();

            if opts.require_empty {
                let existing = count_entries(conn, product_id_v)?;
                if existing > 0 {
                    return Err(MatrixError::conflict(format!(
                        "product '{product_id_v}' already has {existing} matrix entries"
                    ))
                    .into());
                }
            }

            if opts.keep_uploaded {
                // Only MISSING rows whose key is gone; surviving keys keep their ids.
                let fresh: HashSet<&str> = rows.iter().map(|r| r.key).collect();
                let stale: Vec<i32> = me::matrix_entry
                    .filter(
                        me::product_id
                            .eq(product_id_v)
                            .and(me::status.eq(EntryStatus::Missing.as_str())),
                    )
                    .select((me::id, me::combination_key))
                    .load::<(i32, String)>(conn)?
                    .into_iter()
                    .filter(|(_, k)| !fresh.contains(k.as_str()))
                    .map(|(i, _)| i)
                    .collect();
                for chunk in stale.chunks(batch_size) {
                    report.pruned += diesel::delete(
                        me::matrix_entry
                            .filter(me::id.eq_any(chunk.to_vec()))
                            .filter(me::status.eq(EntryStatus::Missing.as_str())),
                    )
                    .execute(conn)?;
                }
            }

            for (index, batch) in rows.chunks(batch_size).enumerate() {
                let (created, existing) = match upsert_batch(conn, product_id_v, batch) {
                    Ok(counts) => counts,
                    Err(first) => {
                        warn!(
                            product = product_id_v,
                            index,
                            error = %first,
                            "upsert batch failed; retrying once"
                        );
                        upsert_batch(conn, product_id_v, batch)
                            .map_err(MatrixError::from)
                            .context(RepoError::BatchFailed { index })?
                    }
                };
                debug!(product = product_id_v, index, created, existing, "batch upserted");
                report.created += created;
                report.existing += existing;
            }

            Ok(report)
        })?;

        info!(
            product = product_id_v,
            created = report.created,
            existing = report.existing,
            pruned = report.pruned,
            keep_uploaded = opts.keep_uploaded,
            "matrix reconciled"
        );
        Ok(report)
    }

    fn get_entry(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
    ) -> RepoResult<Option<MatrixEntry>> {
        load_one(conn, entry_id)?
            .map(MatrixEntry::try_from)
            .transpose()
    }

    fn list_entries(
        &self,
        conn: &mut SqliteConnection,
        product_id_v: &str,
    ) -> RepoResult<Vec<MatrixEntry>> {
        let rows = me::matrix_entry
            .filter(me::product_id.eq(product_id_v))
            .order((me::sort_order.asc(), me::id.asc()))
            .select(MatrixEntryRow::as_select())
            .load(conn)?;
        decode_all(rows)
    }

    fn count_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id_v: &str,
    ) -> RepoResult<i64> {
        count_entries(conn, product_id_v)
    }

    fn find_uploaded_by_key(
        &self,
        conn: &mut SqliteConnection,
        product_id_v: &str,
        key: &CombinationKey,
    ) -> RepoResult<Option<MatrixEntry>> {
        me::matrix_entry
            .filter(
                me::product_id
                    .eq(product_id_v)
                    .and(me::combination_key.eq(key.as_str()))
                    .and(me::status.eq(EntryStatus::Uploaded.as_str())),
            )
            .select(MatrixEntryRow::as_select())
            .first(conn)
            .optional()?
            .map(MatrixEntry::try_from)
            .transpose()
    }

    fn list_uploaded(
        &self,
        conn: &mut SqliteConnection,
        product_id_v: &str,
    ) -> RepoResult<Vec<MatrixEntry>> {
        let rows = me::matrix_entry
            .filter(
                me::product_id
                    .eq(product_id_v)
                    .and(me::status.eq(EntryStatus::Uploaded.as_str())),
            )
            .order((me::sort_order.asc(), me::id.asc()))
            .select(MatrixEntryRow::as_select())
            .load(conn)?;
        decode_all(rows)
    }

    fn attach_asset(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
        stored: &StoredAsset,
        meta: &AssetMetadata,
        expected_version: i32,
    ) -> RepoResult<Option<String>> {
        let uploaded_at_v = to_rfc3339_millis(Utc::now());

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            let Some(current) = load_one(conn, entry_id)? else {
                return Err(MatrixError::not_found(RecordKind::Entry, entry_id.to_string()).into());
            };

            let n = diesel::update(
                me::matrix_entry
                    .filter(me::id.eq(entry_id))
                    .filter(me::asset_version.eq(expected_version)),
            )
            .set(&AssetChangeset {
                status: EntryStatus::Uploaded.as_str(),
                image_url: Some(&stored.url),
                thumbnail_url: Some(&stored.thumbnail_url),
                storage_handle: Some(&stored.handle),
                original_filename: Some(&meta.original_filename),
                file_size: Some(meta.file_size),
                uploaded_at: Some(&uploaded_at_v),
                asset_version: expected_version + 1,
            })
            .execute(conn)?;

            if n == 0 {
                return Err(RepoError::AssetVersionConflict {
                    entry_id,
                    expected: expected_version,
                }
                .into());
            }
            Ok(current.storage_handle)
        })
    }

    fn clear_asset(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
        expected_version: i32,
    ) -> RepoResult<Option<String>> {
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            let Some(current) = load_one(conn, entry_id)? else {
                return Err(MatrixError::not_found(RecordKind::Entry, entry_id.to_string()).into());
            };
            if current.storage_handle.is_none() {
                return Ok(None);
            }

            let n = diesel::update(
                me::matrix_entry
                    .filter(me::id.eq(entry_id))
                    .filter(me::asset_version.eq(expected_version)),
            )
            .set(&AssetChangeset {
                status: EntryStatus::Missing.as_str(),
                image_url: None,
                thumbnail_url: None,
                storage_handle: None,
                original_filename: None,
                file_size: None,
                uploaded_at: None,
                asset_version: expected_version + 1,
            })
            .execute(conn)?;

            if n == 0 {
                return Err(RepoError::AssetVersionConflict {
                    entry_id,
                    expected: expected_version,
                }
                .into());
            }
            Ok(current.storage_handle)
        })
    }

    fn delete_entry(
        &self,
        conn: &mut SqliteConnection,
        entry_id: i32,
    ) -> RepoResult<Option<String>> {
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            let Some(current) = load_one(conn, entry_id)? else {
                return Err(MatrixError::not_found(RecordKind::Entry, entry_id.to_string()).into());
            };
            diesel::delete(me::matrix_entry.find(entry_id)).execute(conn)?;
            Ok(current.storage_handle)
        })
    }

    fn clear_all_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id_v: &str,
    ) -> RepoResult<ClearAllReport> {
        conn.transaction::<_, anyhow::Error, _>(|conn| {
            let released_handles: Vec<String> = me::matrix_entry
                .filter(me::product_id.eq(product_id_v).and(me::storage_handle.is_not_null()))
                .order(me::id.asc())
                .select(me::storage_handle.assume_not_null())
                .load(conn)?;
            let deleted = diesel::delete(me::matrix_entry.filter(me::product_id.eq(product_id_v)))
                .execute(conn)?;
            Ok(ClearAllReport {
                deleted,
                released_handles,
            })
        })
    }
}
