pub mod blob_id;
pub mod blob_type;
pub mod error;
pub mod pack_id;
