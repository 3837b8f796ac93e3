//! Content hashing schemes for fingerprints.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::murmur::{is_whitespace_byte, murmur2};
use crate::types::Fingerprint;

/// A deterministic one-way hash over file contents and strings.
pub trait ContentHasher: Send + Sync + fmt::Debug {
    /// Hash of one resolved file.
    fn hash_file(&self, contents: &[u8]) -> Fingerprint;

    /// Hash of the concatenated per-file fingerprints. Never normalized.
    fn hash_str(&self, value: &str) -> Fingerprint;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintScheme {
    #[default]
    Murmur2,
    Blake3,
}

impl FingerprintScheme {
    pub fn hasher(self, normalize_whitespace: bool) -> Arc<dyn ContentHasher> {
        match self {
            FingerprintScheme::Murmur2 => Arc::new(Murmur2Hasher {
                normalize_whitespace,
            }),
            FingerprintScheme::Blake3 => Arc::new(Blake3Hasher {
                normalize_whitespace,
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FingerprintScheme::Murmur2 => "murmur2",
            FingerprintScheme::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for FingerprintScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FingerprintScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "murmur2" | "murmur" => Ok(FingerprintScheme::Murmur2),
            "blake3" => Ok(FingerprintScheme::Blake3),
            other => anyhow::bail!("Unknown fingerprint scheme: {other}. Use murmur2 or blake3"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Murmur2Hasher {
    pub normalize_whitespace: bool,
}

impl ContentHasher for Murmur2Hasher {
    fn hash_file(&self, contents: &[u8]) -> Fingerprint {
        Fingerprint::Numeric(murmur2(contents, self.normalize_whitespace))
    }

    fn hash_str(&self, value: &str) -> Fingerprint {
        Fingerprint::Numeric(murmur2(value.as_bytes(), false))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Blake3Hasher {
    pub normalize_whitespace: bool,
}

impl ContentHasher for Blake3Hasher {
    fn hash_file(&self, contents: &[u8]) -> Fingerprint {
        let digest = if self.normalize_whitespace {
            let mut hasher = blake3::Hasher::new();
            for chunk in contents.split(|b| is_whitespace_byte(*b)) {
                hasher.update(chunk);
            }
            hasher.finalize()
        } else {
            blake3::hash(contents)
        };
        Fingerprint::Hex(digest.to_hex().to_string())
    }

    fn hash_str(&self, value: &str) -> Fingerprint {
        Fingerprint::Hex(blake3::hash(value.as_bytes()).to_hex().to_string())
    }
}
