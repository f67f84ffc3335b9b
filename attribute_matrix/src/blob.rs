//! Opaque blob storage for matrix images.
//!
//! The matrix only ever stores what [`BlobStore::put`] hands back: a public
//! URL, a thumbnail URL and an opaque handle used later for deletion. No image
//! processing happens here; the filesystem store serves the original bytes as
//! the thumbnail too.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use thiserror::Error;
use uuid::Uuid;

/// What the store returns for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Public URL of the image.
    pub url: String,
    /// Public URL of the thumbnail.
    pub thumbnail_url: String,
    /// Opaque handle for [`BlobStore::delete`].
    pub handle: String,
}

/// Errors raised by blob stores.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Underlying I/O failed.
    #[error("blob I/O failed")]
    Io(#[from] std::io::Error),
    /// The handle does not name a stored blob.
    #[error("blob '{0}' not found")]
    NotFound(String),
    /// The store refused the request.
    #[error("blob store rejected request: {0}")]
    Rejected(String),
}

/// Minimal surface of the external asset store.
pub trait BlobStore {
    /// Store `bytes` and return its locations. `filename` is a hint only.
    fn put(&self, bytes: &[u8], filename: &str) -> Result<StoredAsset, BlobError>;

    /// Remove a stored blob.
    fn delete(&self, handle: &str) -> Result<(), BlobError>;
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
}

fn new_handle(filename: &str) -> String {
    match extension_of(filename) {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    }
}

/// Blob store backed by a local directory served under `base_url`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    /// Create the store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn path_for(&self, handle: &str) -> Result<PathBuf, BlobError> {
        // Handles are generated names; anything with a path component is foreign.
        if handle.is_empty() || handle.contains(['/', '\\']) || handle.starts_with('.') {
            return Err(BlobError::Rejected(format!("invalid handle '{handle}'")));
        }
        Ok(self.root.join(handle))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, bytes: &[u8], filename: &str) -> Result<StoredAsset, BlobError> {
        if bytes.is_empty() {
            return Err(BlobError::Rejected("empty upload".into()));
        }
        let handle = new_handle(filename);
        fs::write(self.path_for(&handle)?, bytes)?;
        let url = format!("{}/{handle}", self.base_url);
        Ok(StoredAsset {
            thumbnail_url: url.clone(),
            url,
            handle,
        })
    }

    fn delete(&self, handle: &str) -> Result<(), BlobError> {
        match fs::remove_file(self.path_for(handle)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(handle.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process blob store. Failure switches let callers exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBlobStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `put` calls fail.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete` calls fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// True if `handle` is stored.
    pub fn contains(&self, handle: &str) -> bool {
        self.blobs
            .lock()
            .map(|b| b.contains_key(handle))
            .unwrap_or(false)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, bytes: &[u8], filename: &str) -> Result<StoredAsset, BlobError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(BlobError::Rejected("uploads disabled".into()));
        }
        let handle = new_handle(filename);
        self.blobs
            .lock()
            .map_err(|_| BlobError::Rejected("store poisoned".into()))?
            .insert(handle.clone(), bytes.to_vec());
        Ok(StoredAsset {
            url: format!("memory://{handle}"),
            thumbnail_url: format!("memory://thumb/{handle}"),
            handle,
        })
    }

    fn delete(&self, handle: &str) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Rejected("deletes disabled".into()));
        }
        self.blobs
            .lock()
            .map_err(|_| BlobError::Rejected("store poisoned".into()))?
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(handle.to_string()))
    }
}
