//! Provider for catalogs that identify add-ons by an id declared in the
//! manifest (e.g. `## X-WoWI-ID: 1234`).

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::wire::{WireDetails, decode_records};
use super::{AddonProvider, MatchKind, MatchResult, ProviderCapabilities, ReconcileOptions};
use crate::catalog::CatalogEntry;
use crate::fingerprint::FingerprintScheme;
use crate::folder::AddonFolder;
use crate::net::{CatalogClient, CircuitState};
use crate::types::ReleaseChannel;

#[derive(Debug, Clone)]
pub struct ManifestIdProvider {
    name: String,
    base_url: Url,
    manifest_key: String,
    website_base: Option<String>,
    client: CatalogClient,
    capabilities: ProviderCapabilities,
}

impl ManifestIdProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        manifest_key: impl Into<String>,
        client: CatalogClient,
    ) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid catalog URL: {base_url}"))?;
        Ok(Self {
            name: name.into(),
            base_url,
            manifest_key: manifest_key.into(),
            website_base: None,
            client,
            capabilities: ProviderCapabilities {
                supports_batch_fetch: true,
                requires_advertisement: false,
                allow_reinstall: true,
                allow_channel_change: false,
            },
        })
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Prefix of public add-on pages, used to fill in website urls.
    pub fn with_website_base(mut self, website_base: impl Into<String>) -> Self {
        self.website_base = Some(website_base.into());
        self
    }

    pub fn manifest_key(&self) -> &str {
        &self.manifest_key
    }

    fn declared_id<'a>(&self, folder: &'a AddonFolder) -> Option<&'a str> {
        folder
            .manifest
            .as_ref()
            .and_then(|m| m.field(&self.manifest_key))
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()))
    }

    async fn details(&self, ids: &[String]) -> anyhow::Result<Vec<WireDetails>> {
        let url = format!(
            "{}/filedetails/{}.json",
            self.base_url.as_str().trim_end_matches('/'),
            ids.join(",")
        );
        let records: Option<Vec<Value>> = self
            .client
            .get_json(&url)
            .await
            .with_context(|| format!("Details lookup failed for provider '{}'", self.name))?;
        Ok(decode_records(records.unwrap_or_default()))
    }
}

#[async_trait]
impl AddonProvider for ManifestIdProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn fingerprint_scheme(&self) -> Option<FingerprintScheme> {
        None
    }

    fn is_available(&self) -> bool {
        self.client.is_available()
    }

    fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.client.breaker().state())
    }

    async fn scan(
        &self,
        folders: &[&AddonFolder],
        _options: &ReconcileOptions,
    ) -> anyhow::Result<Vec<MatchResult>> {
        let mut ids: Vec<String> = Vec::new();
        for folder in folders {
            if let Some(id) = self.declared_id(folder)
                && !ids.iter().any(|known| known == id)
            {
                ids.push(id.to_string());
            }
        }

        let entries: HashMap<String, CatalogEntry> = self
            .get_all(&ids)
            .await?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();

        Ok(folders
            .iter()
            .map(|folder| {
                let Some(entry) = self.declared_id(folder).and_then(|id| entries.get(id)) else {
                    return MatchResult::unmatched(&folder.name);
                };
                MatchResult {
                    folder_name: folder.name.clone(),
                    kind: MatchKind::ExactMatch,
                    provider: Some(self.name.clone()),
                    release: entry.releases.first().cloned(),
                    entry: Some(entry.clone()),
                    matched_release: None,
                    effective_channel: Some(ReleaseChannel::Stable),
                }
            })
            .collect())
    }

    async fn search_by_query(
        &self,
        _query: &str,
        _options: &ReconcileOptions,
    ) -> anyhow::Result<Vec<CatalogEntry>> {
        Ok(Vec::new())
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<CatalogEntry>> {
        match self.details(&[id.to_string()]).await {
            Ok(details) => Ok(details
                .into_iter()
                .next()
                .map(|d| d.into_entry(self.website_base.as_deref()))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_all(&self, ids: &[String]) -> anyhow::Result<Vec<CatalogEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .details(ids)
            .await?
            .into_iter()
            .map(|d| d.into_entry(self.website_base.as_deref()))
            .collect())
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<crate::net::NetworkError>()
        .is_some_and(|e| e.is_not_found())
}
