use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;

use cask_types::error::{CaskError, Result};

use crate::{CryptoEngine, NONCE_LEN, TAG_LEN};

/// ChaCha20-Poly1305 authenticated encryption engine.
pub struct ChaCha20Poly1305Engine {
    cipher: ChaCha20Poly1305,
}

impl ChaCha20Poly1305Engine {
    pub fn new(encryption_key: &[u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new_from_slice(encryption_key)
            .expect("valid 32-byte key for ChaCha20-Poly1305");
        Self { cipher }
    }
}

impl CryptoEngine for ChaCha20Poly1305Engine {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CaskError::Other(format!("ChaCha20-Poly1305 encrypt: {e}")))?;

        // Wire format: [12-byte nonce][ciphertext with appended 16-byte tag]
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CaskError::Authentication);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CaskError::Authentication)
    }
}
