//! Remote catalog records
//!
//! Read-only views of what a provider knows about an add-on. Providers
//! build these from their own wire formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Fingerprint, GameFlavor, ReleaseChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Required,
    Optional,
    Embedded,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDependency {
    pub addon_id: String,
    pub kind: DependencyKind,
}

/// One folder shipped by a release, with the catalog's fingerprint for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseModule {
    pub folder_name: String,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    /// External release id.
    pub id: String,
    pub channel: ReleaseChannel,
    pub version: String,
    pub download_url: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    /// Target flavor; `None` when the catalog does not say.
    pub flavor: Option<GameFlavor>,
    pub game_version: Option<String>,
    pub modules: Vec<ReleaseModule>,
    pub dependencies: Vec<ReleaseDependency>,
    /// Alternate builds (e.g. no-lib packages) are never selected.
    pub is_alternate: bool,
}

impl ReleaseFile {
    pub fn folder_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.folder_name.clone()).collect()
    }

    pub fn has_module_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        self.modules.iter().any(|m| &m.fingerprint == fingerprint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub authors: Vec<String>,
    pub summary: Option<String>,
    pub website_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub screenshot_urls: Vec<String>,
    pub download_count: u64,
    pub releases: Vec<ReleaseFile>,
}

impl CatalogEntry {
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }

    /// Copy of this entry keeping only releases `filter` accepts.
    pub fn compatible(&self, filter: &CompatibilityFilter) -> CatalogEntry {
        CatalogEntry {
            releases: self
                .releases
                .iter()
                .filter(|r| filter.accepts(r))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

/// Which releases can run on the target client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityFilter {
    pub flavor: GameFlavor,
}

impl CompatibilityFilter {
    pub fn new(flavor: GameFlavor) -> Self {
        Self { flavor }
    }

    pub fn accepts(&self, release: &ReleaseFile) -> bool {
        !release.is_alternate && release.flavor.is_none_or(|f| f == self.flavor)
    }
}
