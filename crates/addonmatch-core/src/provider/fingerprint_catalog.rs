//! Provider for catalogs that match add-ons by content fingerprint.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::matching::{MatchSet, classify};
use super::wire::{
    FingerprintRequest, FingerprintResponse, IdsRequest, WireAddon, WireId, decode_records,
};
use super::{AddonProvider, MatchKind, MatchResult, ProviderCapabilities, ReconcileOptions};
use crate::catalog::CatalogEntry;
use crate::channel::select_release;
use crate::fingerprint::FingerprintScheme;
use crate::folder::AddonFolder;
use crate::net::{CatalogClient, CircuitState};
use crate::types::Fingerprint;

#[derive(Debug, Clone)]
pub struct FingerprintCatalogProvider {
    name: String,
    base_url: Url,
    scheme: FingerprintScheme,
    client: CatalogClient,
    capabilities: ProviderCapabilities,
}

impl FingerprintCatalogProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        scheme: FingerprintScheme,
        client: CatalogClient,
    ) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid catalog URL: {base_url}"))?;
        Ok(Self {
            name: name.into(),
            base_url,
            scheme,
            client,
            capabilities: ProviderCapabilities {
                supports_batch_fetch: true,
                requires_advertisement: false,
                allow_reinstall: true,
                allow_channel_change: true,
            },
        })
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn client(&self) -> &CatalogClient {
        &self.client
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Submit fingerprints in one batch request.
    pub async fn fingerprint_matches(&self, fingerprints: &[Fingerprint]) -> anyhow::Result<MatchSet> {
        let url = self.endpoint("fingerprint");
        let body = serde_json::to_value(FingerprintRequest { fingerprints })
            .context("Failed to encode fingerprint request")?;
        let response: Option<FingerprintResponse> = self
            .client
            .post_json(&url, body, true)
            .await
            .with_context(|| format!("Fingerprint lookup failed for provider '{}'", self.name))?;
        Ok(MatchSet::from_response(response.unwrap_or_default()))
    }
}

#[async_trait]
impl AddonProvider for FingerprintCatalogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn fingerprint_scheme(&self) -> Option<FingerprintScheme> {
        Some(self.scheme)
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
        options: &ReconcileOptions,
    ) -> anyhow::Result<Vec<MatchResult>> {
        let mut fingerprints: Vec<Fingerprint> = folders
            .iter()
            .filter_map(|f| f.fingerprint(self.scheme).cloned())
            .collect();
        fingerprints.sort();
        fingerprints.dedup();

        if fingerprints.is_empty() {
            tracing::debug!(provider = %self.name, "no fingerprints to submit");
            return Ok(folders
                .iter()
                .map(|f| MatchResult::unmatched(&f.name))
                .collect());
        }

        let matches = self.fingerprint_matches(&fingerprints).await?;
        let filter = options.filter();

        let classified: Vec<_> = folders
            .iter()
            .map(|folder| match folder.scan(self.scheme) {
                Some(scan) => classify(scan, &matches, &filter),
                None => (MatchKind::Unmatched, None),
            })
            .collect();

        let mut ids: Vec<String> = Vec::new();
        for (_, candidate) in &classified {
            if let Some(c) = candidate
                && !ids.contains(&c.addon_id)
            {
                ids.push(c.addon_id.clone());
            }
        }

        let entries: HashMap<String, CatalogEntry> = self
            .get_all(&ids)
            .await?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();

        let results = folders
            .iter()
            .zip(classified)
            .map(|(folder, (kind, candidate))| {
                let Some(candidate) = candidate else {
                    return MatchResult::unmatched(&folder.name);
                };
                let Some(entry) = entries.get(&candidate.addon_id) else {
                    tracing::debug!(
                        folder = %folder.name,
                        addon = %candidate.addon_id,
                        "matched add-on missing from catalog response"
                    );
                    return MatchResult::unmatched(&folder.name);
                };

                let mut entry = entry.compatible(&filter);
                if entry.releases.is_empty() {
                    entry.releases.push(candidate.release.clone());
                }
                let Some(selection) = select_release(&entry, options.channel) else {
                    return MatchResult::unmatched(&folder.name);
                };

                MatchResult {
                    folder_name: folder.name.clone(),
                    kind,
                    provider: Some(self.name.clone()),
                    entry: Some(entry),
                    matched_release: Some(candidate.release.clone()),
                    release: Some(selection.release),
                    effective_channel: Some(selection.effective_channel),
                }
            })
            .collect();

        Ok(results)
    }

    async fn search_by_query(
        &self,
        query: &str,
        options: &ReconcileOptions,
    ) -> anyhow::Result<Vec<CatalogEntry>> {
        let mut url = Url::parse(&self.endpoint("search")).context("Invalid search URL")?;
        url.query_pairs_mut()
            .append_pair("gameVersionFlavor", options.flavor.catalog_key())
            .append_pair("searchFilter", query);

        let records: Option<Vec<Value>> = self
            .client
            .get_json(url.as_str())
            .await
            .with_context(|| format!("Search failed for provider '{}'", self.name))?;

        let filter = options.filter();
        Ok(decode_records::<WireAddon>(records.unwrap_or_default())
            .into_iter()
            .map(|a| CatalogEntry::from(a).compatible(&filter))
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<CatalogEntry>> {
        let url = self.endpoint(&format!("addon/{id}"));
        match self.client.get_json::<Option<WireAddon>>(&url).await {
            Ok(addon) => Ok(addon.map(CatalogEntry::from)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to fetch add-on {id}")),
        }
    }

    async fn get_all(&self, ids: &[String]) -> anyhow::Result<Vec<CatalogEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let wire_ids: Vec<WireId> = ids
            .iter()
            .map(|id| match id.parse::<u64>() {
                Ok(n) => WireId::Number(n),
                Err(_) => WireId::Text(id.clone()),
            })
            .collect();
        let body = serde_json::to_value(IdsRequest { ids: &wire_ids })
            .context("Failed to encode add-on request")?;

        let records: Option<Vec<Value>> = self
            .client
            .post_json(&self.endpoint("addon"), body, true)
            .await
            .with_context(|| format!("Batch add-on fetch failed for provider '{}'", self.name))?;

        Ok(decode_records::<WireAddon>(records.unwrap_or_default())
            .into_iter()
            .map(CatalogEntry::from)
            .collect())
    }
}
