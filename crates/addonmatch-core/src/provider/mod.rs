//! Remote catalog providers
//!
//! Each provider wraps one remote catalog behind [`AddonProvider`]:
//! - `fingerprint_catalog`: matches folders by content fingerprint
//! - `manifest_id`: matches folders by a provider id declared in the manifest
//! - `registry`: ordered provider set and the reconciliation pass
//! - `matching`: pure exact/partial match classification

pub mod fingerprint_catalog;
pub mod manifest_id;
pub mod matching;
pub mod registry;
pub mod wire;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, CompatibilityFilter, ReleaseFile};
use crate::fingerprint::FingerprintScheme;
use crate::folder::AddonFolder;
use crate::net::CircuitState;
use crate::types::{GameFlavor, ReleaseChannel};

pub use fingerprint_catalog::FingerprintCatalogProvider;
pub use manifest_id::ManifestIdProvider;
pub use registry::{ProviderFailure, ProviderRegistry, ReconcileReport, ScanEvent};

/// What a provider supports, declared up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Catalog entries for many ids can be fetched in one request.
    pub supports_batch_fetch: bool,
    /// The catalog's terms require showing its advertisement.
    pub requires_advertisement: bool,
    pub allow_reinstall: bool,
    pub allow_channel_change: bool,
}

/// Target client and channel preference for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileOptions {
    pub flavor: GameFlavor,
    pub channel: ReleaseChannel,
}

impl ReconcileOptions {
    pub fn new(flavor: GameFlavor, channel: ReleaseChannel) -> Self {
        Self { flavor, channel }
    }

    pub fn filter(&self) -> CompatibilityFilter {
        CompatibilityFilter::new(self.flavor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    #[default]
    Unmatched,
    ExactMatch,
    PartialMatch,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Unmatched => "unmatched",
            MatchKind::ExactMatch => "exact",
            MatchKind::PartialMatch => "partial",
        }
    }
}

/// Outcome of matching one folder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchResult {
    pub folder_name: String,
    pub kind: MatchKind,
    /// Provider that produced the match.
    pub provider: Option<String>,
    pub entry: Option<CatalogEntry>,
    /// Release whose fingerprints matched the folder (what is installed).
    pub matched_release: Option<ReleaseFile>,
    /// Release selected for the channel preference (what to install).
    pub release: Option<ReleaseFile>,
    pub effective_channel: Option<ReleaseChannel>,
}

impl MatchResult {
    pub fn unmatched(folder_name: impl Into<String>) -> Self {
        Self {
            folder_name: folder_name.into(),
            ..Self::default()
        }
    }

    pub fn is_matched(&self) -> bool {
        self.kind != MatchKind::Unmatched
    }

    pub fn external_id(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.id.as_str())
    }

    pub fn latest_version(&self) -> Option<&str> {
        self.release.as_ref().map(|r| r.version.as_str())
    }
}

/// One remote catalog.
///
/// `scan` returns exactly one [`MatchResult`] per submitted folder, in
/// submission order. Errors mean the whole provider failed for this pass.
#[async_trait]
pub trait AddonProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Scheme this provider's catalog fingerprints with, if it matches by
    /// content at all.
    fn fingerprint_scheme(&self) -> Option<FingerprintScheme>;

    /// False while the provider's circuit breaker is rejecting calls.
    fn is_available(&self) -> bool;

    fn circuit_state(&self) -> Option<CircuitState> {
        None
    }

    async fn scan(
        &self,
        folders: &[&AddonFolder],
        options: &ReconcileOptions,
    ) -> anyhow::Result<Vec<MatchResult>>;

    async fn search_by_query(
        &self,
        query: &str,
        options: &ReconcileOptions,
    ) -> anyhow::Result<Vec<CatalogEntry>>;

    /// `Ok(None)` when the catalog has no such add-on.
    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<CatalogEntry>>;

    /// Entries for `ids`; ids the catalog does not know are left out.
    async fn get_all(&self, ids: &[String]) -> anyhow::Result<Vec<CatalogEntry>>;
}
