pub mod aes_gcm;
pub mod chacha20_poly1305;
pub mod key;
pub mod select;

use cask_types::error::Result;

use crate::aes_gcm::Aes256GcmEngine;
use crate::chacha20_poly1305::ChaCha20Poly1305Engine;

/// Nonce width shared by both AEAD engines.
pub const NONCE_LEN: usize = 12;
/// Authentication tag width shared by both AEAD engines.
pub const TAG_LEN: usize = 16;
/// Fixed per-message envelope overhead: `[nonce][..][tag]`.
pub const CIPHERTEXT_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Ciphertext size for a plaintext of `plaintext_len` bytes.
///
/// Pure arithmetic — no crypto operation. Callers use this for pre-flight
/// size accounting (e.g. computing a pack's total size before writing).
/// Every [`CryptoEngine`] must produce ciphertexts of exactly this length.
pub fn ciphertext_length(plaintext_len: usize) -> usize {
    plaintext_len + CIPHERTEXT_OVERHEAD
}

/// Trait for encrypting and decrypting stored objects.
///
/// Engines hold a cipher built from an externally derived 32-byte key; key
/// derivation and wrapping live in [`key`]. Wire format for every message is
/// `[12-byte nonce][ciphertext + 16-byte tag]` with a fresh random nonce per
/// `encrypt` call.
pub trait CryptoEngine: Send + Sync {
    /// Encrypt plaintext. Returns `[nonce][ciphertext+tag]`.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt data produced by `encrypt`. All-or-nothing: a failed tag
    /// verification returns `CaskError::Authentication` and no bytes.
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Which AEAD protects repository objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Aes256Gcm,
    ChaCha20Poly1305,
}

/// Build an engine for `mode` from a 32-byte encryption key.
pub fn engine_for_mode(mode: EncryptionMode, encryption_key: &[u8; 32]) -> Box<dyn CryptoEngine> {
    match mode {
        EncryptionMode::Aes256Gcm => Box::new(Aes256GcmEngine::new(encryption_key)),
        EncryptionMode::ChaCha20Poly1305 => Box::new(ChaCha20Poly1305Engine::new(encryption_key)),
    }
}
