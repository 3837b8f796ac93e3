//! Application context for dependency injection.
//!
//! Frontends build this once at startup and pass it to every command. It
//! owns the loaded configuration and the provider registry, so there is no
//! global state anywhere in the crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::config::{AddonmatchConfig, ConfigStore, ProviderConfigEntry, ProviderKind};
use crate::fingerprint::FingerprintScheme;
use crate::folder::{AddonFolder, fingerprint_folders, list_addon_folders};
use crate::fs::{AddonFs, LocalFs};
use crate::net::{CatalogClient, NetworkConfig, ReqwestTransport, Transport};
use crate::provider::registry::DirectoryReport;
use crate::provider::{
    AddonProvider, FingerprintCatalogProvider, ManifestIdProvider, ProviderRegistry,
    ReconcileOptions, ScanEvent,
};

#[derive(Debug, Clone)]
pub struct AppContext {
    config: AddonmatchConfig,
    config_path: PathBuf,
    registry: Arc<ProviderRegistry>,
    fs: Arc<dyn AddonFs>,
}

impl AppContext {
    /// Load the config from `store` and wire up the production stack.
    pub fn load(store: &ConfigStore) -> anyhow::Result<Self> {
        let config = store.load()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
        Self::with_parts(config, store.config_path().to_path_buf(), transport, Arc::new(LocalFs))
    }

    /// Build a context from explicit parts (tests inject fakes here).
    pub fn with_parts(
        config: AddonmatchConfig,
        config_path: PathBuf,
        transport: Arc<dyn Transport>,
        fs: Arc<dyn AddonFs>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let registry = build_registry(&config, transport)?;
        Ok(Self {
            config,
            config_path,
            registry: Arc::new(registry),
            fs,
        })
    }

    pub fn config(&self) -> &AddonmatchConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn fs(&self) -> &Arc<dyn AddonFs> {
        &self.fs
    }

    /// Flavor and channel from `[scan]`.
    pub fn default_options(&self) -> ReconcileOptions {
        ReconcileOptions::new(self.config.scan.flavor, self.config.scan.channel)
    }

    /// Enumerate and fingerprint `addons_dir` under `scheme` without
    /// contacting any catalog.
    pub async fn scan_directory(
        &self,
        addons_dir: &Path,
        scheme: FingerprintScheme,
    ) -> anyhow::Result<Vec<AddonFolder>> {
        let mut folders =
            list_addon_folders(self.fs.as_ref(), addons_dir, self.config.scan.flavor).await?;
        fingerprint_folders(
            Arc::clone(&self.fs),
            &mut folders,
            &[scheme],
            self.config.scan.normalize_whitespace,
        )
        .await;
        Ok(folders)
    }

    pub async fn reconcile_directory(
        &self,
        addons_dir: &Path,
        options: &ReconcileOptions,
        events: Option<&mpsc::Sender<ScanEvent>>,
    ) -> anyhow::Result<DirectoryReport> {
        self.registry
            .reconcile_directory(
                Arc::clone(&self.fs),
                addons_dir,
                options,
                self.config.scan.normalize_whitespace,
                events,
            )
            .await
    }
}

/// Create one provider per `[[provider]]` entry, in file order.
pub fn build_registry(
    config: &AddonmatchConfig,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<ProviderRegistry> {
    let network = config.network.to_network_config();
    let mut registry = ProviderRegistry::new();
    for entry in &config.providers {
        let provider = build_provider(entry, Arc::clone(&transport), network)
            .with_context(|| format!("Failed to set up provider '{}'", entry.name))?;
        registry.register(provider)?;
        registry.set_enabled(&entry.name, entry.enabled)?;
    }
    Ok(registry)
}

fn build_provider(
    entry: &ProviderConfigEntry,
    transport: Arc<dyn Transport>,
    network: NetworkConfig,
) -> anyhow::Result<Arc<dyn AddonProvider>> {
    let client = entry.headers.iter().fold(
        CatalogClient::new(entry.name.clone(), transport, network),
        |client, (name, value)| client.with_default_header(name.clone(), value.clone()),
    );
    let provider: Arc<dyn AddonProvider> = match entry.kind {
        ProviderKind::Fingerprint => Arc::new(
            FingerprintCatalogProvider::new(
                entry.name.clone(),
                &entry.base_url,
                entry.scheme.unwrap_or_default(),
                client,
            )?
            .with_capabilities(entry.capabilities()),
        ),
        ProviderKind::ManifestId => {
            let key = entry
                .manifest_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("manifest_key is required"))?;
            let mut provider =
                ManifestIdProvider::new(entry.name.clone(), &entry.base_url, key, client)?
                    .with_capabilities(entry.capabilities());
            if let Some(website) = &entry.website_url {
                provider = provider.with_website_base(website.clone());
            }
            Arc::new(provider)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::net::{HttpRequest, NetworkError};

    #[derive(Debug)]
    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn execute(&self, request: HttpRequest) -> Result<String, NetworkError> {
            Err(NetworkError::Transport {
                url: request.url,
                message: "offline".to_string(),
            })
        }
    }

    #[derive(Debug, Default)]
    struct Recording(std::sync::Mutex<Vec<HttpRequest>>);

    #[async_trait]
    impl Transport for Recording {
        async fn execute(&self, request: HttpRequest) -> Result<String, NetworkError> {
            self.0.lock().unwrap().push(request);
            Ok("null".to_string())
        }
    }

    #[tokio::test]
    async fn configured_headers_reach_the_transport() {
        let mut config = AddonmatchConfig::default();
        config.providers[0]
            .headers
            .insert("x-api-key".to_string(), "secret".to_string());
        let transport = Arc::new(Recording::default());

        let ctx = AppContext::with_parts(
            config,
            PathBuf::from("/tmp/addonmatch.toml"),
            transport.clone(),
            Arc::new(LocalFs),
        )
        .expect("context should build");
        let provider = ctx.registry().get("curseforge").unwrap();
        assert!(provider.get_by_id("1").await.unwrap().is_none());

        let requests = transport.0.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.contains(&("x-api-key".to_string(), "secret".to_string())));
    }

    #[test]
    fn registry_follows_config_order_and_flags() {
        let mut config = AddonmatchConfig::default();
        config.providers[1].enabled = false;

        let ctx = AppContext::with_parts(
            config,
            PathBuf::from("/tmp/addonmatch.toml"),
            Arc::new(Offline),
            Arc::new(LocalFs),
        )
        .expect("context should build");

        assert_eq!(ctx.registry().names(), vec!["curseforge", "wowinterface"]);
        assert!(ctx.registry().is_enabled("curseforge"));
        assert!(!ctx.registry().is_enabled("wowinterface"));
        assert_eq!(ctx.registry().required_schemes(), vec![FingerprintScheme::Murmur2]);
        let caps = ctx.registry().get("curseforge").unwrap().capabilities();
        assert!(caps.requires_advertisement);
    }
}
