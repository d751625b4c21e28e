//! Pack container encoding and decoding.
//!
//! A pack is an ordered run of blob ciphertexts, followed by one encrypted
//! header describing them, followed by a 4-byte big-endian trailer holding
//! the encrypted header's length:
//!
//! ```text
//! [ blob_1_ciphertext ] ... [ blob_N_ciphertext ]
//! [ encrypted_header_ciphertext ]
//! [ header_length: u32 BE ]
//! ```
//!
//! Each header record is fixed-size: `[type u8][ciphertext_length u32 BE]`
//! `[blob_id 32B]`, in append order. Offsets are never stored — decoders
//! reconstruct them as the running sum of prior ciphertext lengths, matching
//! the encode-time accumulation exactly.

use std::io::Write;

use cask_crypto::{ciphertext_length, CryptoEngine};
use cask_types::blob_id::BlobId;
use cask_types::blob_type::BlobType;
use cask_types::error::{CaskError, Result};
use cask_types::pack_id::PackId;

use crate::storage::StorageBackend;

/// Size of one header record: type tag + ciphertext length + blob id.
pub const HEADER_ENTRY_SIZE: usize = 1 + 4 + BlobId::LEN;
/// Size of the trailing header-length field.
pub const TRAILER_SIZE: usize = 4;

/// Location of one blob inside a finalized pack. These are exactly the
/// tuples a repository index is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackEntry {
    pub id: BlobId,
    pub blob_type: BlobType,
    /// Byte offset of the blob's ciphertext within the pack.
    pub offset: u64,
    /// Length of the blob's ciphertext.
    pub length: u32,
}

/// Header plaintext size for a pack holding `blob_count` blobs.
pub fn header_plaintext_size(blob_count: usize) -> usize {
    blob_count * HEADER_ENTRY_SIZE
}

/// Accumulates encrypted blobs into a pack, streaming each ciphertext to the
/// sink as it is added. Holds no blob data in memory beyond the one being
/// written; only the fixed-size header records are retained for `finalize`.
///
/// Not safe for concurrent `add` calls — header ordering and the running
/// offset are sequential state. Independent packers targeting distinct packs
/// may run in parallel freely.
pub struct Packer<'a, W: Write> {
    crypto: &'a dyn CryptoEngine,
    writer: W,
    entries: Vec<PackEntry>,
    bytes_written: u64,
}

impl<'a, W: Write> Packer<'a, W> {
    pub fn new(crypto: &'a dyn CryptoEngine, writer: W) -> Self {
        Self {
            crypto,
            writer,
            entries: Vec::new(),
            bytes_written: 0,
        }
    }

    /// Encrypt `plaintext` and append it to the pack. Returns the offset at
    /// which the blob's ciphertext starts.
    ///
    /// The caller guarantees `id == BlobId::compute(plaintext)`; this is a
    /// faithful, non-validating writer. A failed sink write leaves the pack
    /// in an indeterminate state — discard it, never resume.
    pub fn add(&mut self, blob_type: BlobType, id: BlobId, plaintext: &[u8]) -> Result<u64> {
        let ciphertext = self.crypto.encrypt(plaintext)?;
        let offset = self.bytes_written;
        self.writer.write_all(&ciphertext)?;
        self.bytes_written += ciphertext.len() as u64;
        self.entries.push(PackEntry {
            id,
            blob_type,
            offset,
            length: ciphertext.len() as u32,
        });
        Ok(offset)
    }

    /// Bytes of blob ciphertext written so far (the running offset).
    pub fn size(&self) -> u64 {
        self.bytes_written
    }

    /// Exact total pack size `finalize` would produce right now.
    /// Pure arithmetic — useful for backend pre-allocation and budgeting.
    pub fn expected_size(&self) -> u64 {
        self.bytes_written
            + ciphertext_length(header_plaintext_size(self.entries.len())) as u64
            + TRAILER_SIZE as u64
    }

    /// Number of blobs added so far.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Locations of the blobs added so far, in append order.
    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    /// Encrypt and append the header, write the trailer, and return the sink
    /// together with the exact total pack size.
    ///
    /// Consuming `self` makes the packer single-use: a finalized (or failed)
    /// pack can never be appended to or finalized again.
    pub fn finalize(mut self) -> Result<(W, u64)> {
        let mut header = Vec::with_capacity(header_plaintext_size(self.entries.len()));
        for entry in &self.entries {
            header.push(entry.blob_type.to_u8());
            header.extend_from_slice(&entry.length.to_be_bytes());
            header.extend_from_slice(&entry.id.0);
        }

        let encrypted_header = self.crypto.encrypt(&header)?;
        self.writer.write_all(&encrypted_header)?;
        self.writer
            .write_all(&(encrypted_header.len() as u32).to_be_bytes())?;

        let total = self.bytes_written + encrypted_header.len() as u64 + TRAILER_SIZE as u64;
        Ok((self.writer, total))
    }
}

/// Read and decode the header of a stored pack, reconstructing each blob's
/// offset by prefix sum over the recorded ciphertext lengths.
///
/// `pack_size` must be the exact byte length of the pack object; any
/// disagreement with the stored bytes surfaces as `CorruptPack`, never a
/// silent truncation. Read-only — any number of `list` calls may run
/// concurrently against the same pack.
pub fn list(
    crypto: &dyn CryptoEngine,
    storage: &dyn StorageBackend,
    pack_id: &PackId,
    pack_size: u64,
) -> Result<Vec<PackEntry>> {
    let key = pack_id.storage_key();

    let min_size = (TRAILER_SIZE + cask_crypto::CIPHERTEXT_OVERHEAD) as u64;
    if pack_size < min_size {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id} too small: {pack_size} bytes, need at least {min_size}"
        )));
    }

    let trailer = storage
        .get_range(&key, pack_size - TRAILER_SIZE as u64, TRAILER_SIZE as u64)?
        .ok_or_else(|| CaskError::Other(format!("pack not found: {pack_id}")))?;
    if trailer.len() != TRAILER_SIZE {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: short trailer read, expected {TRAILER_SIZE} bytes, got {}",
            trailer.len()
        )));
    }
    let header_len = u32::from_be_bytes(
        trailer
            .as_slice()
            .try_into()
            .map_err(|_| CaskError::CorruptPack(format!("pack {pack_id}: invalid trailer")))?,
    ) as u64;

    if header_len + TRAILER_SIZE as u64 > pack_size {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: header length {header_len} exceeds pack size {pack_size}"
        )));
    }
    if header_len < cask_crypto::CIPHERTEXT_OVERHEAD as u64 {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: header length {header_len} below envelope overhead"
        )));
    }

    let header_offset = pack_size - TRAILER_SIZE as u64 - header_len;
    let encrypted_header = storage
        .get_range(&key, header_offset, header_len)?
        .ok_or_else(|| CaskError::Other(format!("pack not found: {pack_id}")))?;
    if encrypted_header.len() as u64 != header_len {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: short header read at offset {header_offset}, \
             expected {header_len} bytes, got {}",
            encrypted_header.len()
        )));
    }

    let header = crypto.decrypt(&encrypted_header)?;
    if header.len() % HEADER_ENTRY_SIZE != 0 {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: header size {} is not a multiple of {HEADER_ENTRY_SIZE}",
            header.len()
        )));
    }

    let mut entries = Vec::with_capacity(header.len() / HEADER_ENTRY_SIZE);
    let mut offset = 0u64;
    for record in header.chunks_exact(HEADER_ENTRY_SIZE) {
        let blob_type = BlobType::from_u8(record[0])?;
        let length = u32::from_be_bytes(
            record[1..5]
                .try_into()
                .map_err(|_| CaskError::CorruptPack(format!("pack {pack_id}: invalid record")))?,
        );
        let mut id = [0u8; BlobId::LEN];
        id.copy_from_slice(&record[5..]);
        entries.push(PackEntry {
            id: BlobId(id),
            blob_type,
            offset,
            length,
        });
        offset += length as u64;
    }

    // The exact-size invariant: blobs + encrypted header + trailer, nothing else.
    let expected = offset + header_len + TRAILER_SIZE as u64;
    if expected != pack_size {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: length sum mismatch, entries cover {expected} bytes \
             but pack is {pack_size} bytes"
        )));
    }

    Ok(entries)
}

/// Read one blob from a stored pack via a range read, decrypt it, and verify
/// its content address. An id mismatch after successful decryption is a
/// fatal integrity failure, surfaced as `CorruptPack`.
pub fn read_blob(
    crypto: &dyn CryptoEngine,
    storage: &dyn StorageBackend,
    pack_id: &PackId,
    entry: &PackEntry,
) -> Result<Vec<u8>> {
    let data = storage
        .get_range(&pack_id.storage_key(), entry.offset, entry.length as u64)?
        .ok_or_else(|| CaskError::Other(format!("pack not found: {pack_id}")))?;
    if data.len() != entry.length as usize {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: short blob read at offset {}, expected {} bytes, got {}",
            entry.offset,
            entry.length,
            data.len()
        )));
    }

    let plaintext = crypto.decrypt(&data)?;
    let actual = BlobId::compute(&plaintext);
    if actual != entry.id {
        return Err(CaskError::CorruptPack(format!(
            "pack {pack_id}: blob id mismatch at offset {}, expected {}, got {}",
            entry.offset, entry.id, actual
        )));
    }
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryBackend;
    use cask_crypto::chacha20_poly1305::ChaCha20Poly1305Engine;
    use cask_crypto::CIPHERTEXT_OVERHEAD;

    fn test_engine() -> ChaCha20Poly1305Engine {
        ChaCha20Poly1305Engine::new(&[0x5Cu8; 32])
    }

    fn build_pack(
        engine: &dyn CryptoEngine,
        blobs: &[(BlobType, Vec<u8>)],
    ) -> (PackId, Vec<u8>, Vec<PackEntry>) {
        let mut packer = Packer::new(engine, Vec::new());
        for (blob_type, data) in blobs {
            packer
                .add(*blob_type, BlobId::compute(data), data)
                .unwrap();
        }
        let entries = packer.entries().to_vec();
        let (bytes, total) = packer.finalize().unwrap();
        assert_eq!(bytes.len() as u64, total);
        (PackId::compute(&bytes), bytes, entries)
    }

    fn store_pack(storage: &MemoryBackend, pack_id: &PackId, bytes: &[u8]) {
        storage.put(&pack_id.storage_key(), bytes).unwrap();
    }

    #[test]
    fn minimal_pack_single_23_byte_blob() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let data = vec![0x17u8; 23];
        let (pack_id, bytes, _) = build_pack(&engine, &[(BlobType::Data, data.clone())]);
        store_pack(&storage, &pack_id, &bytes);

        let entries = list(&engine, &storage, &pack_id, bytes.len() as u64).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[0].length as usize, ciphertext_length(23));
        assert_eq!(entries[0].blob_type, BlobType::Data);

        let plaintext = read_blob(&engine, &storage, &pack_id, &entries[0]).unwrap();
        assert_eq!(plaintext, data);
    }

    #[test]
    fn zero_blob_pack_round_trips() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let (pack_id, bytes, _) = build_pack(&engine, &[]);
        // Empty header ciphertext + trailer only.
        assert_eq!(bytes.len(), CIPHERTEXT_OVERHEAD + TRAILER_SIZE);
        store_pack(&storage, &pack_id, &bytes);

        let entries = list(&engine, &storage, &pack_id, bytes.len() as u64).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn size_accounting_is_exact() {
        let engine = test_engine();
        for lens in [vec![], vec![1usize], vec![23, 127, 5211], vec![4096; 9]] {
            let blobs: Vec<(BlobType, Vec<u8>)> = lens
                .iter()
                .enumerate()
                .map(|(i, &l)| (BlobType::Data, vec![i as u8; l]))
                .collect();
            let (_, bytes, _) = build_pack(&engine, &blobs);

            let expected: usize = lens.iter().map(|&l| ciphertext_length(l)).sum::<usize>()
                + ciphertext_length(header_plaintext_size(lens.len()))
                + TRAILER_SIZE;
            assert_eq!(bytes.len(), expected, "lens {lens:?}");
        }
    }

    #[test]
    fn expected_size_matches_finalize() {
        let engine = test_engine();
        let mut packer = Packer::new(&engine, Vec::new());
        packer
            .add(BlobType::Tree, BlobId::compute(b"t"), b"t")
            .unwrap();
        packer
            .add(BlobType::Data, BlobId::compute(b"dd"), b"dd")
            .unwrap();
        let predicted = packer.expected_size();
        let (bytes, total) = packer.finalize().unwrap();
        assert_eq!(total, predicted);
        assert_eq!(bytes.len() as u64, predicted);
    }

    #[test]
    fn offsets_are_prefix_sums_in_append_order() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let blobs = vec![
            (BlobType::Data, vec![1u8; 100]),
            (BlobType::Tree, vec![2u8; 50]),
            (BlobType::Data, vec![3u8; 7]),
        ];
        let (pack_id, bytes, encode_entries) = build_pack(&engine, &blobs);
        store_pack(&storage, &pack_id, &bytes);

        let entries = list(&engine, &storage, &pack_id, bytes.len() as u64).unwrap();
        assert_eq!(entries, encode_entries);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[1].offset, ciphertext_length(100) as u64);
        assert_eq!(
            entries[2].offset,
            (ciphertext_length(100) + ciphertext_length(50)) as u64
        );
        assert_eq!(entries[1].blob_type, BlobType::Tree);
    }

    #[test]
    fn same_id_as_data_and_tree_coexist() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let payload = vec![9u8; 64];
        let (pack_id, bytes, _) = build_pack(
            &engine,
            &[
                (BlobType::Data, payload.clone()),
                (BlobType::Tree, payload.clone()),
            ],
        );
        store_pack(&storage, &pack_id, &bytes);

        let entries = list(&engine, &storage, &pack_id, bytes.len() as u64).unwrap();
        assert_eq!(entries[0].id, entries[1].id);
        assert_ne!(entries[0].blob_type, entries[1].blob_type);
        for e in &entries {
            assert_eq!(read_blob(&engine, &storage, &pack_id, e).unwrap(), payload);
        }
    }

    #[test]
    fn wrong_pack_size_is_corrupt() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let (pack_id, bytes, _) = build_pack(&engine, &[(BlobType::Data, vec![0u8; 42])]);
        store_pack(&storage, &pack_id, &bytes);

        // Claiming a larger size points the trailer read past the object.
        let too_big = bytes.len() as u64 + 8;
        assert!(list(&engine, &storage, &pack_id, too_big).is_err());

        // Claiming a smaller size lands the trailer inside the header.
        let too_small = bytes.len() as u64 - 8;
        assert!(list(&engine, &storage, &pack_id, too_small).is_err());
    }

    #[test]
    fn truncated_pack_is_rejected() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let (pack_id, _, _) = build_pack(&engine, &[]);
        storage.put(&pack_id.storage_key(), &[0u8; 3]).unwrap();
        match list(&engine, &storage, &pack_id, 3) {
            Err(CaskError::CorruptPack(msg)) => assert!(msg.contains("too small")),
            other => panic!("expected CorruptPack, got {other:?}"),
        }
    }

    #[test]
    fn header_length_exceeding_pack_is_corrupt() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let (pack_id, mut bytes, _) = build_pack(&engine, &[(BlobType::Data, vec![5u8; 10])]);
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&u32::MAX.to_be_bytes());
        store_pack(&storage, &pack_id, &bytes);

        match list(&engine, &storage, &pack_id, n as u64) {
            Err(CaskError::CorruptPack(msg)) => assert!(msg.contains("exceeds pack size")),
            other => panic!("expected CorruptPack, got {other:?}"),
        }
    }

    #[test]
    fn tampered_header_fails_authentication() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let (pack_id, mut bytes, _) = build_pack(&engine, &[(BlobType::Data, vec![5u8; 10])]);
        // Flip a byte inside the encrypted header (just before the trailer).
        let idx = bytes.len() - TRAILER_SIZE - 1;
        bytes[idx] ^= 0x80;
        store_pack(&storage, &pack_id, &bytes);

        assert!(matches!(
            list(&engine, &storage, &pack_id, bytes.len() as u64),
            Err(CaskError::Authentication)
        ));
    }

    #[test]
    fn tampered_blob_fails_on_read() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        let data = vec![0xEEu8; 256];
        let (pack_id, mut bytes, _) = build_pack(&engine, &[(BlobType::Data, data)]);
        bytes[40] ^= 0x01; // inside the blob ciphertext
        store_pack(&storage, &pack_id, &bytes);

        let entries = list(&engine, &storage, &pack_id, bytes.len() as u64).unwrap();
        assert!(matches!(
            read_blob(&engine, &storage, &pack_id, &entries[0]),
            Err(CaskError::Authentication)
        ));
    }

    #[test]
    fn unknown_blob_type_in_header_is_rejected() {
        // Hand-roll a pack whose single header record carries type tag 7.
        let engine = test_engine();
        let storage = MemoryBackend::new();

        let ciphertext = engine.encrypt(b"payload").unwrap();
        let mut header = Vec::new();
        header.push(7u8);
        header.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
        header.extend_from_slice(&BlobId::compute(b"payload").0);
        let encrypted_header = engine.encrypt(&header).unwrap();

        let mut bytes = ciphertext;
        bytes.extend_from_slice(&encrypted_header);
        bytes.extend_from_slice(&(encrypted_header.len() as u32).to_be_bytes());

        let pack_id = PackId::compute(&bytes);
        store_pack(&storage, &pack_id, &bytes);

        assert!(matches!(
            list(&engine, &storage, &pack_id, bytes.len() as u64),
            Err(CaskError::UnknownBlobType(7))
        ));
    }

    #[test]
    fn blob_id_mismatch_is_fatal() {
        let engine = test_engine();
        let storage = MemoryBackend::new();
        // The packer trusts the caller's id; read_blob must catch the lie.
        let mut packer = Packer::new(&engine, Vec::new());
        packer
            .add(BlobType::Data, BlobId::compute(b"claimed"), b"actual")
            .unwrap();
        let entries = packer.entries().to_vec();
        let (bytes, _) = packer.finalize().unwrap();
        let pack_id = PackId::compute(&bytes);
        store_pack(&storage, &pack_id, &bytes);

        match read_blob(&engine, &storage, &pack_id, &entries[0]) {
            Err(CaskError::CorruptPack(msg)) => assert!(msg.contains("id mismatch")),
            other => panic!("expected CorruptPack, got {other:?}"),
        }
    }
}
