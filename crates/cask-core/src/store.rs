use tracing::debug;

use cask_crypto::CryptoEngine;
use cask_types::blob_id::BlobId;
use cask_types::blob_type::BlobType;
use cask_types::error::Result;
use cask_types::pack_id::PackId;

use crate::pack::{PackEntry, Packer};
use crate::storage::StorageBackend;

/// Maximum number of blobs in a single pack file.
/// Prevents pathological cases where many tiny blobs create a pack with a
/// huge header.
pub const MAX_BLOBS_PER_PACK: usize = 10_000;

/// Default pack size budget.
pub const DEFAULT_TARGET_SIZE: usize = 16 * 1024 * 1024;

/// A pack that has been sealed and uploaded: its content-derived identity,
/// its exact byte size, and the per-blob locations an index is built from.
#[derive(Debug, Clone)]
pub struct FlushedPack {
    pub pack_id: PackId,
    pub size: u64,
    pub entries: Vec<PackEntry>,
}

/// Accumulates blobs into an in-progress pack up to a size budget, then
/// seals it and uploads it under its content-hash name.
///
/// Single-writer: all mutating calls on one store must be serialized by the
/// caller (the `&mut self` API enforces this). Independent stores — e.g. one
/// per worker, or one for data and one for tree blobs — run fully in
/// parallel with no shared state.
pub struct PackStore<'a> {
    crypto: &'a dyn CryptoEngine,
    storage: &'a dyn StorageBackend,
    target_size: usize,
    current: Option<Packer<'a, Vec<u8>>>,
}

impl<'a> PackStore<'a> {
    pub fn new(
        crypto: &'a dyn CryptoEngine,
        storage: &'a dyn StorageBackend,
        target_size: usize,
    ) -> Self {
        Self {
            crypto,
            storage,
            target_size,
            current: None,
        }
    }

    /// Add one blob to the in-progress pack. When the addition fills the
    /// pack past its budget (or the blob-count cap), the pack is sealed and
    /// uploaded, and its locations are returned for index building.
    ///
    /// The caller guarantees `id == BlobId::compute(plaintext)` and is
    /// responsible for dedup — a blob passed in here will be stored.
    pub fn add(
        &mut self,
        blob_type: BlobType,
        id: BlobId,
        plaintext: &[u8],
    ) -> Result<Option<FlushedPack>> {
        let crypto = self.crypto;
        let packer = self
            .current
            .get_or_insert_with(|| Packer::new(crypto, Vec::new()));
        packer.add(blob_type, id, plaintext)?;

        if self.should_flush() {
            self.flush()
        } else {
            Ok(None)
        }
    }

    /// Whether the in-progress pack has reached its size budget or blob cap.
    fn should_flush(&self) -> bool {
        match &self.current {
            Some(packer) => {
                packer.size() as usize >= self.target_size
                    || packer.count() >= MAX_BLOBS_PER_PACK
            }
            None => false,
        }
    }

    /// Whether any blobs are buffered in an unsealed pack.
    pub fn has_pending(&self) -> bool {
        self.current.as_ref().is_some_and(|p| p.count() > 0)
    }

    /// Seal and upload the in-progress pack, if any. Returns `None` when
    /// nothing is pending — empty packs are never uploaded.
    ///
    /// On upload failure the sealed pack is lost and must be rebuilt by
    /// re-adding its blobs; the store itself remains usable for new packs.
    pub fn flush(&mut self) -> Result<Option<FlushedPack>> {
        let Some(packer) = self.current.take() else {
            return Ok(None);
        };
        if packer.count() == 0 {
            return Ok(None);
        }

        let entries = packer.entries().to_vec();
        let (bytes, size) = packer.finalize()?;
        let pack_id = PackId::compute(&bytes);
        self.storage.put(&pack_id.storage_key(), &bytes)?;

        debug!(
            pack = %pack_id,
            blobs = entries.len(),
            bytes = size,
            "flushed pack"
        );

        Ok(Some(FlushedPack {
            pack_id,
            size,
            entries,
        }))
    }
}
