//! Content digests for inventoried files
//!
//! Digests are computed by streaming the file through a fixed-size buffer,
//! so memory stays bounded no matter how large the file is.

pub mod checksum;

pub use checksum::{digest_bytes, ContentHasher, DEFAULT_CHUNK_SIZE, DIGEST_HEX_LEN};
