//! Error taxonomy surfaced by the admin operations.
//!
//! Entry points return `anyhow::Result`; these variants travel inside it and
//! can be recovered with `err.downcast_ref::<MatrixError>()`.

use thiserror::Error;

use crate::blob::BlobError;

/// Kind of record a [`MatrixError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A catalog product.
    Product,
    /// A matrix entry.
    Entry,
    /// An attribute definition.
    Attribute,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Product => "product",
            Self::Entry => "matrix entry",
            Self::Attribute => "attribute",
        })
    }
}

/// Errors raised by generation, reconciliation, asset handling and resolution.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// Input was missing or produced nothing usable.
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong, with the attribute/rule context if any.
        message: String,
    },
    /// The operation collides with existing state.
    #[error("conflict: {message}")]
    Conflict {
        /// What collided.
        message: String,
    },
    /// A referenced record does not exist.
    #[error("{kind} '{id}' not found{}", format_context(.context))]
    NotFound {
        /// Kind of record.
        kind: RecordKind,
        /// Missing id.
        id: String,
        /// Where the reference came from.
        context: Option<String>,
    },
    /// The blob store rejected an upload. The cause is the error source.
    #[error("asset store error")]
    AssetStore(#[from] BlobError),
    /// The database rejected a statement. The cause is the error source.
    #[error("storage error")]
    Storage(#[from] diesel::result::Error),
}

fn format_context(context: &Option<String>) -> String {
    context
        .as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

impl MatrixError {
    /// Shorthand for [`MatrixError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for [`MatrixError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for [`MatrixError::NotFound`] without context.
    pub fn not_found(kind: RecordKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
            context: None,
        }
    }

    /// [`MatrixError::NotFound`] naming where the dangling reference came from.
    pub fn dangling(kind: RecordKind, id: impl Into<String>, context: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
            context: Some(context.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages() {
        let plain = MatrixError::not_found(RecordKind::Entry, "42");
        assert_eq!(plain.to_string(), "matrix entry '42' not found");

        let ctx = MatrixError::dangling(RecordKind::Attribute, "uv", "rule 'hide-uv' target");
        assert_eq!(ctx.to_string(), "attribute 'uv' not found (rule 'hide-uv' target)");
    }

    #[test]
    fn storage_cause_is_reported_once() {
        let err = anyhow::Error::from(MatrixError::from(diesel::result::Error::NotFound));
        let chain = format!("{err:#}");
        assert_eq!(chain, "storage error: Record not found");
        assert_eq!(chain.matches("Record not found").count(), 1);
    }

    #[test]
    fn survives_anyhow_round_trip() {
        let err: anyhow::Error = MatrixError::conflict("entries exist").into();
        assert!(matches!(
            err.downcast_ref::<MatrixError>(),
            Some(MatrixError::Conflict { .. })
        ));
    }
}
