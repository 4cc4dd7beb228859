//! Durable storage for Wardlink.
//!
//! Provides the blob-store abstraction over the external key-value surface,
//! the canonical device record store with its dedup matcher, and the
//! debounced persistence scheduler.

pub mod backends;
pub mod blob;
pub mod dedup;
pub mod error;
pub mod persist;
pub mod store;

pub use blob::BlobStore;
pub use backends::{create_backend, BlobBackend};
pub use dedup::{find_match, MATCH_RULES};
pub use error::{Error, Result};
pub use persist::{PersistScheduler, PersistStats};
pub use store::{DeviceStore, StoreSnapshot, UpsertOutcome};
