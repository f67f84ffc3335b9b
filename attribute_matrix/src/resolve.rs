//! Selection resolver: live (possibly partial) selection -> uploaded image.
//!
//! 1. Exact key: encode the selection and probe the unique index.
//! 2. Otherwise scan UPLOADED entries for one whose stored assignment is a
//!    value-equal subset of the selection. The best candidate matches the most
//!    attributes; ties go to the lowest `sort_order`, then the lowest id.
//!
//! The stored assignment is what is compared, never the key string.

use std::cmp::Reverse;

use diesel::SqliteConnection;
use serde::Serialize;
use tracing::debug;

use crate::key::{Assignment, encode};
use crate::matrix::{MatrixEntry, MatrixRepo};

/// How a selection was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MatchKind {
    /// The selection's key equals the entry's key.
    Exact,
    /// The entry's assignment is contained in the selection.
    Subset {
        /// Attributes the entry and the selection share.
        matched: usize,
    },
}

/// A resolved entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Entry whose image to show.
    pub entry: MatrixEntry,
    /// How it was found.
    pub kind: MatchKind,
}

/// Lowercase ids and trim values; unset (empty) attributes are dropped.
pub fn normalize_selection<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Assignment {
    pairs
        .into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}

/// True if every pair of `stored` appears with an equal value in `selection`.
pub fn is_subset_of(stored: &Assignment, selection: &Assignment) -> bool {
    stored
        .iter()
        .all(|(k, v)| selection.get(k).is_some_and(|s| s == v))
}

/// Best subset candidate among `entries`.
pub fn best_subset_match<'e>(
    entries: &'e [MatrixEntry],
    selection: &Assignment,
) -> Option<&'e MatrixEntry> {
    entries
        .iter()
        .filter(|e| is_subset_of(&e.assignment, selection))
        .min_by_key(|e| (Reverse(e.assignment.len()), e.sort_order, e.id))
}

/// Resolve `selection` for a product. Read-only.
pub fn resolve(
    repo: &dyn MatrixRepo,
    conn: &mut SqliteConnection,
    product_id: &str,
    selection: &Assignment,
) -> anyhow::Result<Option<Resolution>> {
    let key = encode(selection);
    if let Some(entry) = repo.find_uploaded_by_key(conn, product_id, &key)? {
        debug!(product = product_id, key = %key, "exact match");
        return Ok(Some(Resolution {
            entry,
            kind: MatchKind::Exact,
        }));
    }

    let uploaded = repo.list_uploaded(conn, product_id)?;
    let found = best_subset_match(&uploaded, selection).cloned();
    debug!(
        product = product_id,
        key = %key,
        candidates = uploaded.len(),
        found = ?found.as_ref().map(|e| e.id),
        "subset fallback"
    );
    Ok(found.map(|entry| Resolution {
        kind: MatchKind::Subset {
            matched: entry.assignment.len(),
        },
        entry,
    }))
}
