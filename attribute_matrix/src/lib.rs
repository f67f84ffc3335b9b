//! Attribute rule engine and combination matrix.
//!
//! Products expose selection attributes; rules hide or restrict later
//! attributes based on earlier choices; some values open nested
//! sub-attributes. This crate enumerates only the valid combinations of a
//! product, persists them as a sparse matrix of image slots, and resolves a
//! live selection to the best uploaded image.
//!
//! - [`catalog`]: TOML catalog, sync into SQLite, read API for generation
//! - [`engine`]: expansion, rule evaluation, pruned enumeration
//! - [`matrix`]: persistent entries and reconciliation
//! - [`resolve`]: selection -> image
//! - [`service`]: admin operations tying the above together

#![deny(missing_docs)]

pub mod attribute;
pub mod blob;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod error;
pub mod key;
pub mod logging;
pub mod matrix;
pub mod models;
pub mod resolve;
#[allow(missing_docs)]
pub mod schema;
pub mod service;
pub mod settings;
pub mod timestamp;

pub use error::{MatrixError, RecordKind};
