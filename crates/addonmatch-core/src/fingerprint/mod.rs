//! Deterministic content fingerprints for add-on folders
//!
//! - `scanner`: include resolution and aggregate hashing
//! - `includes`: comment stripping and include directive parsing
//! - `hasher`: pluggable hash schemes (MurmurHash2, BLAKE3)

pub mod hasher;
pub mod includes;
pub mod murmur;
pub mod scanner;

pub use hasher::{Blake3Hasher, ContentHasher, FingerprintScheme, Murmur2Hasher};
pub use scanner::{FingerprintScanner, MAX_INCLUDE_DEPTH, ScanResult};
