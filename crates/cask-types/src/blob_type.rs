use serde::{Deserialize, Serialize};

use crate::error::{CaskError, Result};

/// Distinguishes file-content blobs from metadata-tree blobs.
///
/// The type is part of the lookup key: the same id may exist as both a Data
/// and a Tree entry without collision. Higher layers serialize the type as
/// the case-sensitive strings `"data"` / `"tree"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobType {
    Data,
    Tree,
}

impl BlobType {
    /// Wire tag used in pack header records.
    pub fn to_u8(self) -> u8 {
        match self {
            BlobType::Data => 0,
            BlobType::Tree => 1,
        }
    }

    /// Parse a wire tag. Unknown tags are an error, never coerced: silently
    /// defaulting a type would corrupt (type, id) dedup lookups upstream.
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(BlobType::Data),
            1 => Ok(BlobType::Tree),
            _ => Err(CaskError::UnknownBlobType(v)),
        }
    }
}
