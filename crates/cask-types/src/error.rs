use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaskError>;

#[derive(Debug, Error)]
pub enum CaskError {
    /// Ciphertext tag verification failed: wrong key, truncated, or tampered
    /// data. Fatal for the bytes at hand — retrying means re-fetching them.
    #[error("authentication failed: wrong key or corrupted data")]
    Authentication,

    /// A structural invariant of a pack file was violated (length sums,
    /// trailer, header bounds). Unrecoverable for that pack object.
    #[error("corrupt pack: {0}")]
    CorruptPack(String),

    #[error("unknown blob type tag: {0}")]
    UnknownBlobType(u8),

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
