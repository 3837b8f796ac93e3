//! Configuration schema for addonmatch.toml
//!
//! - `[scan]`: target flavor, channel preference, hashing options
//! - `[network]`: timeouts, breaker thresholds and cache lifetime
//! - `[[provider]]`: catalogs, in match priority order

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintScheme;
use crate::net::NetworkConfig;
use crate::provider::ProviderCapabilities;
use crate::types::{GameFlavor, ReleaseChannel};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonmatchConfig {
    #[serde(default)]
    pub scan: ScanSection,

    #[serde(default)]
    pub network: NetworkSection,

    /// Providers in match priority order
    #[serde(default = "default_providers", rename = "provider")]
    pub providers: Vec<ProviderConfigEntry>,
}

impl Default for AddonmatchConfig {
    fn default() -> Self {
        Self {
            scan: ScanSection::default(),
            network: NetworkSection::default(),
            providers: default_providers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSection {
    #[serde(default)]
    pub flavor: GameFlavor,

    #[serde(default)]
    pub channel: ReleaseChannel,

    /// Drop tab, newline, carriage return and space bytes before hashing
    #[serde(default = "default_true")]
    pub normalize_whitespace: bool,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            flavor: GameFlavor::default(),
            channel: ReleaseChannel::default(),
            normalize_whitespace: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            http_timeout_ms: default_http_timeout_ms(),
            reset_timeout_ms: default_reset_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl NetworkSection {
    pub fn to_network_config(&self) -> NetworkConfig {
        NetworkConfig {
            http_timeout: Duration::from_millis(self.http_timeout_ms),
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            failure_threshold: self.failure_threshold,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

/// How a provider identifies installed add-ons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Content fingerprints submitted in one batch
    Fingerprint,
    /// Provider id declared in the manifest
    ManifestId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfigEntry {
    pub name: String,

    pub kind: ProviderKind,

    pub base_url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fingerprint kind: hash scheme the catalog uses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<FingerprintScheme>,

    /// Manifest-id kind: manifest field holding the provider id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,

    /// Prefix of the catalog's public add-on pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,

    #[serde(default)]
    pub requires_advertisement: bool,

    #[serde(default = "default_true")]
    pub allow_reinstall: bool,

    #[serde(default = "default_true")]
    pub allow_channel_change: bool,

    /// Extra headers sent with every request (API keys and the like)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ProviderConfigEntry {
    pub fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_batch_fetch: true,
            requires_advertisement: self.requires_advertisement,
            allow_reinstall: self.allow_reinstall,
            allow_channel_change: self.allow_channel_change,
        }
    }

    /// Validate one provider entry
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Provider name must not be empty");
        }
        url::Url::parse(&self.base_url).map_err(|e| {
            anyhow::anyhow!("Provider '{}': invalid base_url '{}': {}", self.name, self.base_url, e)
        })?;
        if let Some(website) = &self.website_url {
            url::Url::parse(website).map_err(|e| {
                anyhow::anyhow!("Provider '{}': invalid website_url '{}': {}", self.name, website, e)
            })?;
        }
        match self.kind {
            ProviderKind::ManifestId
                if self.manifest_key.as_deref().is_none_or(|k| k.trim().is_empty()) =>
            {
                anyhow::bail!("Provider '{}': manifest-id providers need a manifest_key", self.name)
            }
            ProviderKind::ManifestId if self.scheme.is_some() => {
                anyhow::bail!("Provider '{}': scheme only applies to fingerprint providers", self.name)
            }
            _ => Ok(()),
        }
    }
}

impl AddonmatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.failure_threshold == 0 {
            anyhow::bail!("network.failure_threshold must be at least 1");
        }
        if self.network.http_timeout_ms == 0 {
            anyhow::bail!("network.http_timeout_ms must be greater than 0");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.name.as_str()) {
                anyhow::bail!("Duplicate provider name: {}", provider.name);
            }
        }
        Ok(())
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfigEntry> {
        self.providers.iter().find(|p| p.name == name)
    }
}

fn default_true() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_providers() -> Vec<ProviderConfigEntry> {
    vec![
        ProviderConfigEntry {
            name: "curseforge".to_string(),
            kind: ProviderKind::Fingerprint,
            base_url: "https://hub.dev.wowup.io/curseforge/addons".to_string(),
            enabled: true,
            scheme: Some(FingerprintScheme::Murmur2),
            manifest_key: None,
            website_url: None,
            requires_advertisement: true,
            allow_reinstall: true,
            allow_channel_change: true,
            headers: BTreeMap::new(),
        },
        ProviderConfigEntry {
            name: "wowinterface".to_string(),
            kind: ProviderKind::ManifestId,
            base_url: "https://api.mmoui.com/v4/game/WOW".to_string(),
            enabled: true,
            scheme: None,
            manifest_key: Some("X-WoWI-ID".to_string()),
            website_url: Some("https://www.wowinterface.com/downloads".to_string()),
            requires_advertisement: false,
            allow_reinstall: true,
            allow_channel_change: false,
            headers: BTreeMap::new(),
        },
    ]
}
