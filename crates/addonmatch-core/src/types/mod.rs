//! Shared core types used across scanning, matching and release selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Release stability tier, ordered by strictness.
///
/// `Stable < Beta < Alpha`: a preference of `Beta` accepts both stable and
/// beta releases, a preference of `Alpha` accepts everything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    #[default]
    Stable,
    Beta,
    Alpha,
}

impl ReleaseChannel {
    /// Whether a release on `self` is acceptable for a `preferred` channel.
    pub fn satisfies(self, preferred: ReleaseChannel) -> bool {
        self <= preferred
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseChannel::Stable => "stable",
            ReleaseChannel::Beta => "beta",
            ReleaseChannel::Alpha => "alpha",
        }
    }
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseChannel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" | "release" => Ok(ReleaseChannel::Stable),
            "beta" => Ok(ReleaseChannel::Beta),
            "alpha" => Ok(ReleaseChannel::Alpha),
            other => anyhow::bail!("Unknown release channel: {other}. Use stable, beta or alpha"),
        }
    }
}

/// Game client flavor a release targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameFlavor {
    #[default]
    Retail,
    Classic,
    BurningCrusade,
    Wrath,
}

impl GameFlavor {
    /// Flavor identifier used by fingerprint catalogs (`gameVersionFlavor`).
    pub fn catalog_key(self) -> &'static str {
        match self {
            GameFlavor::Retail => "wow_retail",
            GameFlavor::Classic => "wow_classic",
            GameFlavor::BurningCrusade => "wow_burning_crusade",
            GameFlavor::Wrath => "wow_wrath",
        }
    }

    pub fn from_catalog_key(key: &str) -> Option<Self> {
        match key {
            "wow_retail" => Some(GameFlavor::Retail),
            "wow_classic" => Some(GameFlavor::Classic),
            "wow_burning_crusade" => Some(GameFlavor::BurningCrusade),
            "wow_wrath" => Some(GameFlavor::Wrath),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameFlavor::Retail => "retail",
            GameFlavor::Classic => "classic",
            GameFlavor::BurningCrusade => "burning-crusade",
            GameFlavor::Wrath => "wrath",
        }
    }
}

impl fmt::Display for GameFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameFlavor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retail" | "mainline" => Ok(GameFlavor::Retail),
            "classic" | "vanilla" => Ok(GameFlavor::Classic),
            "burning-crusade" | "tbc" | "bcc" => Ok(GameFlavor::BurningCrusade),
            "wrath" | "wotlkc" => Ok(GameFlavor::Wrath),
            other => anyhow::bail!("Unknown game flavor: {other}"),
        }
    }
}

/// A content fingerprint.
///
/// Numeric fingerprints come from 32-bit hash schemes and sort numerically;
/// hex fingerprints come from digest schemes and sort lexicographically.
/// Serialized untagged so catalogs see a plain JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fingerprint {
    Numeric(u32),
    Hex(String),
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Numeric(n) => write!(f, "{n}"),
            Fingerprint::Hex(s) => f.write_str(s),
        }
    }
}
