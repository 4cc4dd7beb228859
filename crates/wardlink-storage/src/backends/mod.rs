//! Blob backend implementations.
//!
//! The external durable surface is modeled as named blobs. Implementations
//! are feature-gated so the in-memory backend can be compiled out of
//! embedded builds.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

#[cfg(feature = "redb")]
pub mod redb;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redb")]
pub use redb::{RedbBackend, RedbBackendConfig};

#[cfg(feature = "memory")]
pub use memory::MemoryBackend;

/// Named-blob storage surface.
///
/// Writes are atomic per blob; readers of a name observe either the previous
/// or the new content, never a mixture.
pub trait BlobBackend: Send + Sync {
    /// Write a blob, replacing any previous content under the name.
    fn write(&self, name: &str, value: &[u8]) -> Result<()>;

    /// Read a blob. `Ok(None)` when the name has never been written.
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob. Returns whether it existed.
    fn delete(&self, name: &str) -> Result<bool>;

    /// List blob names with the given prefix.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether contents survive process restart.
    fn is_persistent(&self) -> bool;
}

/// Create a blob backend by type identifier.
pub fn create_backend(backend_type: &str, config: &Value) -> Result<Arc<dyn BlobBackend>> {
    match backend_type {
        #[cfg(feature = "redb")]
        "redb" => {
            let cfg: RedbBackendConfig = serde_json::from_value(config.clone())
                .map_err(|e| Error::InvalidInput(format!("Invalid redb config: {}", e)))?;
            Ok(Arc::new(RedbBackend::new(cfg)?))
        }

        #[cfg(feature = "memory")]
        "memory" => Ok(Arc::new(MemoryBackend::new())),

        _ => Err(Error::InvalidInput(format!(
            "Unknown backend type: {}. Available backends: {}",
            backend_type,
            available_backends().join(", ")
        ))),
    }
}

/// List of available backend types (based on enabled features).
pub fn available_backends() -> Vec<&'static str> {
    #[cfg(feature = "redb")]
    {
        #[cfg(feature = "memory")]
        return vec!["redb", "memory"];
        #[cfg(not(feature = "memory"))]
        return vec!["redb"];
    }
    #[cfg(all(not(feature = "redb"), feature = "memory"))]
    return vec!["memory"];
    #[cfg(all(not(feature = "redb"), not(feature = "memory")))]
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_backends() {
        assert!(!available_backends().is_empty());
    }

    #[test]
    fn test_create_backend_unknown() {
        let result = create_backend("unknown", &serde_json::json!({}));
        assert!(result.is_err());
    }

    #[cfg(feature = "memory")]
    #[test]
    fn test_create_memory_backend() {
        let backend = create_backend("memory", &serde_json::json!({})).unwrap();
        assert!(!backend.is_persistent());
    }
}
