//! Byte storage addressed by URI.

use super::InterchangeError;
use crate::base::Uri;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Where encoded units are kept.
///
/// URIs reaching a store have already been converted through the path
/// variable table.
pub trait ResourceStore: Send + Sync {
    fn read(&self, uri: &Uri) -> Result<Vec<u8>, InterchangeError>;

    fn write(&self, uri: &Uri, bytes: &[u8]) -> Result<(), InterchangeError>;

    fn exists(&self, uri: &Uri) -> bool;

    fn is_read_only(&self, uri: &Uri) -> bool {
        let _ = uri;
        false
    }

    fn delete(&self, uri: &Uri) -> Result<(), InterchangeError>;
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// Store keeping units in memory; the default for tests and scratch domains.
#[derive(Debug, Default)]
pub struct MemoryStore {
    units: RwLock<FxHashMap<Uri, Vec<u8>>>,
    read_only: RwLock<FxHashSet<Uri>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&self, uri: &Uri, read_only: bool) {
        let mut set = self.read_only.write();
        if read_only {
            set.insert(uri.clone());
        } else {
            set.remove(uri);
        }
    }

    /// URIs currently stored, sorted.
    pub fn uris(&self) -> Vec<Uri> {
        let mut uris: Vec<Uri> = self.units.read().keys().cloned().collect();
        uris.sort();
        uris
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}

impl ResourceStore for MemoryStore {
    fn read(&self, uri: &Uri) -> Result<Vec<u8>, InterchangeError> {
        self.units
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| InterchangeError::NotFound(uri.clone()))
    }

    fn write(&self, uri: &Uri, bytes: &[u8]) -> Result<(), InterchangeError> {
        trace!(%uri, len = bytes.len(), "memory store write");
        self.units.write().insert(uri.clone(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, uri: &Uri) -> bool {
        self.units.read().contains_key(uri)
    }

    fn is_read_only(&self, uri: &Uri) -> bool {
        self.read_only.read().contains(uri)
    }

    fn delete(&self, uri: &Uri) -> Result<(), InterchangeError> {
        self.units
            .write()
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| InterchangeError::NotFound(uri.clone()))
    }
}

// ============================================================================
// FILE STORE
// ============================================================================

/// Store mapping URIs to files.
///
/// `file:` URIs name absolute paths. Any other `scheme:rest` URI is placed
/// under `root/scheme/rest`, which keeps test domains inside one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `uri`.
    pub fn path_of(&self, uri: &Uri) -> Result<PathBuf, InterchangeError> {
        let raw = uri.as_str();
        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = raw.strip_prefix("file:") {
            return Ok(PathBuf::from(path));
        }
        let (scheme, rest) = match uri.scheme() {
            Some(scheme) => (scheme, &raw[scheme.len() + 1..]),
            None => ("relative", raw),
        };
        let mut path = self.root.join(scheme);
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                return Err(InterchangeError::store(uri, "parent segments are not allowed"));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

impl ResourceStore for FileStore {
    fn read(&self, uri: &Uri) -> Result<Vec<u8>, InterchangeError> {
        let path = self.path_of(uri)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(InterchangeError::NotFound(uri.clone()))
            }
            Err(e) => Err(InterchangeError::Io(e)),
        }
    }

    fn write(&self, uri: &Uri, bytes: &[u8]) -> Result<(), InterchangeError> {
        let path = self.path_of(uri)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        trace!(path = %path.display(), len = bytes.len(), "file store write");
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    fn exists(&self, uri: &Uri) -> bool {
        self.path_of(uri).is_ok_and(|p| p.is_file())
    }

    fn is_read_only(&self, uri: &Uri) -> bool {
        self.path_of(uri)
            .ok()
            .and_then(|p| std::fs::metadata(p).ok())
            .is_some_and(|m| m.permissions().readonly())
    }

    fn delete(&self, uri: &Uri) -> Result<(), InterchangeError> {
        let path = self.path_of(uri)?;
        std::fs::remove_file(path)?;
        Ok(())
    }
}
