//! JSON blob store over a [`BlobBackend`].
//!
//! Reads are tolerant: a missing blob, invalid JSON or a shape mismatch all
//! fall back to `None` so a first run or a corrupted surface never prevents
//! startup.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::backends::BlobBackend;
use crate::error::Result;

/// Typed JSON view of the named-blob surface.
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
}

impl BlobStore {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self { backend }
    }

    /// Serialize and write a blob.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.write(name, &bytes)
    }

    /// Read and deserialize a blob, tolerating absence and corrupt content.
    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let bytes = match self.backend.read(name) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to read blob '{}': {}", name, e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("blob '{}' has unexpected content, ignoring: {}", name, e);
                None
            }
        }
    }

    /// Delete a blob.
    pub fn delete(&self, name: &str) -> Result<bool> {
        self.backend.delete(name)
    }

    /// List blob names with the given prefix.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.backend.list(prefix)
    }

    /// Whether the underlying backend is persistent.
    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;

    fn store() -> BlobStore {
        BlobStore::new(Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn test_json_round_trip() {
        let store = store();
        store.write_json("devices", &vec![1u32, 2, 3]).unwrap();
        let loaded: Option<Vec<u32>> = store.read_json("devices");
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_read_absent_is_none() {
        let store = store();
        let loaded: Option<Vec<u32>> = store.read_json("devices");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_corrupt_is_none() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write("devices", b"{not json").unwrap();
        let store = BlobStore::new(backend);

        let loaded: Option<Vec<u32>> = store.read_json("devices");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_shape_mismatch_is_none() {
        let store = store();
        store.write_json("devices", &"a string").unwrap();
        let loaded: Option<Vec<u32>> = store.read_json("devices");
        assert!(loaded.is_none());
    }
}
