//! In-memory blob backend for tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use super::BlobBackend;
use crate::error::Result;

/// Non-persistent blob backend over a locked map.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobBackend for MemoryBackend {
    fn write(&self, name: &str, value: &[u8]) -> Result<()> {
        self.blobs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self
            .blobs
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(name)
            .is_some())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let backend = MemoryBackend::new();
        backend.write("bindings", b"[]").unwrap();
        assert_eq!(backend.read("bindings").unwrap(), Some(b"[]".to_vec()));
        assert_eq!(backend.read("other").unwrap(), None);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_overwrite() {
        let backend = MemoryBackend::new();
        backend.write("devices", b"old").unwrap();
        backend.write("devices", b"new").unwrap();
        assert_eq!(backend.read("devices").unwrap(), Some(b"new".to_vec()));
    }
}
