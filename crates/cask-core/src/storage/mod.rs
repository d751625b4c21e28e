pub mod local_backend;

pub use local_backend::LocalBackend;

use cask_types::error::Result;

/// Capability set the pack core requires from a storage transport.
///
/// Keys are `/`-separated paths (e.g. `packs/ab/<hex>`). Implementations
/// must be safe to share across threads; every method is a single
/// self-contained operation with no cross-call state.
pub trait StorageBackend: Send + Sync {
    /// Read a whole object. `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write an object, replacing any existing value atomically.
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove an object. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// List all object keys under `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Random-access read of `length` bytes at `offset`. `Ok(None)` if the
    /// key does not exist; reads past the end of the object may come back
    /// short, and callers validate the returned length.
    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>>;
}
