//! Catalog subsystem.
//!
//! This module groups configuration and normalization utilities for the product
//! catalog, which describes attributes, their values and sub-attributes,
//! products, and the rules that constrain them. See [`crate::catalog::config`]
//! for the TOML model and helpers, [`crate::catalog::sync`] for loading it into
//! SQLite, and [`crate::catalog::source`] for reading it back for generation.

pub mod config;
pub mod repo;
pub mod source;
pub mod sync;

pub use source::{CatalogSource, SqliteCatalog};
