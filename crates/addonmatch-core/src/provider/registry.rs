//! Provider registry and the reconciliation pass
//!
//! Providers are held in registration order and looked up by name. A pass
//! snapshots the enabled set when it starts, offers every matchable folder
//! to the first provider, then only the still-unmatched folders to each
//! following one. The first provider to match a folder wins.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{AddonProvider, MatchResult, ReconcileOptions};
use crate::fingerprint::FingerprintScheme;
use crate::folder::{AddonFolder, fingerprint_folders, list_addon_folders};
use crate::fs::AddonFs;
use crate::net::NetworkError;

/// Progress of a reconciliation pass, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ScanEvent {
    Started { folders: usize, providers: usize },
    ProviderStarted { provider: String, folders: usize },
    /// The provider's circuit breaker is open; it sits this pass out.
    ProviderSkipped { provider: String },
    ProviderFailed { provider: String, error: String },
    ProviderFinished { provider: String, matched: usize },
    Completed { matched: usize, unmatched: usize },
}

/// A provider that contributed nothing to a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
    pub circuit_open: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// One result per input folder, in input order.
    pub results: Vec<MatchResult>,
    pub failures: Vec<ProviderFailure>,
}

impl ReconcileReport {
    pub fn matched(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().filter(|r| r.is_matched())
    }

    pub fn matched_count(&self) -> usize {
        self.matched().count()
    }

    pub fn unmatched_count(&self) -> usize {
        self.results.len() - self.matched_count()
    }
}

/// Folders found on disk together with the pass over them.
#[derive(Debug, Clone, Default)]
pub struct DirectoryReport {
    pub folders: Vec<AddonFolder>,
    pub report: ReconcileReport,
}

#[derive(Debug)]
struct Registered {
    provider: Arc<dyn AddonProvider>,
    enabled: AtomicBool,
}

/// Ordered set of catalog providers.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<Registered>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider. Registration order is match priority.
    pub fn register(&mut self, provider: Arc<dyn AddonProvider>) -> anyhow::Result<()> {
        if self.get(provider.name()).is_some() {
            anyhow::bail!("Provider '{}' is already registered", provider.name());
        }
        self.providers.push(Registered {
            provider,
            enabled: AtomicBool::new(true),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AddonProvider>> {
        self.providers
            .iter()
            .find(|r| r.provider.name() == name)
            .map(|r| Arc::clone(&r.provider))
    }

    pub fn names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|r| r.provider.name().to_string())
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn AddonProvider>> {
        self.providers.iter().map(|r| Arc::clone(&r.provider)).collect()
    }

    /// Enabled providers, in registration order.
    pub fn enabled(&self) -> Vec<Arc<dyn AddonProvider>> {
        self.providers
            .iter()
            .filter(|r| r.enabled.load(Ordering::Acquire))
            .map(|r| Arc::clone(&r.provider))
            .collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.providers
            .iter()
            .any(|r| r.provider.name() == name && r.enabled.load(Ordering::Acquire))
    }

    /// Takes effect from the next pass; a running pass keeps its snapshot.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> anyhow::Result<()> {
        let registered = self
            .providers
            .iter()
            .find(|r| r.provider.name() == name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider: {name}"))?;
        registered.enabled.store(enabled, Ordering::Release);
        tracing::debug!(provider = name, enabled, "provider toggled");
        Ok(())
    }

    /// Fingerprint schemes needed by the enabled providers, deduplicated.
    pub fn required_schemes(&self) -> Vec<FingerprintScheme> {
        let mut schemes = Vec::new();
        for provider in self.enabled() {
            if let Some(scheme) = provider.fingerprint_scheme()
                && !schemes.contains(&scheme)
            {
                schemes.push(scheme);
            }
        }
        schemes
    }

    /// Run one reconciliation pass over already scanned folders.
    ///
    /// Provider failures never abort the pass: the failing provider simply
    /// matches nothing and is listed in the report.
    pub async fn reconcile(
        &self,
        folders: &[AddonFolder],
        options: &ReconcileOptions,
        events: Option<&mpsc::Sender<ScanEvent>>,
    ) -> ReconcileReport {
        let snapshot = self.enabled();
        let mut results: Vec<MatchResult> = folders
            .iter()
            .map(|f| MatchResult::unmatched(&f.name))
            .collect();
        let mut failures = Vec::new();
        let mut pending: Vec<usize> = folders
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_matchable())
            .map(|(i, _)| i)
            .collect();

        tracing::info!(
            folders = folders.len(),
            matchable = pending.len(),
            providers = snapshot.len(),
            flavor = %options.flavor,
            channel = %options.channel,
            "starting reconciliation"
        );
        emit(
            events,
            ScanEvent::Started {
                folders: pending.len(),
                providers: snapshot.len(),
            },
        )
        .await;

        for provider in snapshot {
            if pending.is_empty() {
                break;
            }
            let name = provider.name().to_string();

            if !provider.is_available() {
                tracing::warn!(provider = %name, "circuit open, skipping provider");
                failures.push(ProviderFailure {
                    provider: name.clone(),
                    error: "circuit breaker is open".to_string(),
                    circuit_open: true,
                });
                emit(events, ScanEvent::ProviderSkipped { provider: name }).await;
                continue;
            }

            let offered: Vec<&AddonFolder> = pending.iter().map(|&i| &folders[i]).collect();
            emit(
                events,
                ScanEvent::ProviderStarted {
                    provider: name.clone(),
                    folders: offered.len(),
                },
            )
            .await;

            match provider.scan(&offered, options).await {
                Ok(provider_results) => {
                    let mut matched = 0;
                    let mut still_pending = Vec::with_capacity(pending.len());
                    let mut by_folder = provider_results.into_iter();
                    for &index in &pending {
                        let result = by_folder.next();
                        match result {
                            Some(r) if r.is_matched() && r.folder_name == folders[index].name => {
                                results[index] = r;
                                matched += 1;
                            }
                            Some(r) if r.folder_name != folders[index].name => {
                                tracing::warn!(
                                    provider = %name,
                                    expected = %folders[index].name,
                                    got = %r.folder_name,
                                    "result out of order, ignored"
                                );
                                still_pending.push(index);
                            }
                            _ => still_pending.push(index),
                        }
                    }
                    pending = still_pending;
                    tracing::info!(provider = %name, matched, "provider finished");
                    emit(events, ScanEvent::ProviderFinished { provider: name, matched }).await;
                }
                Err(e) => {
                    let circuit_open = e
                        .downcast_ref::<NetworkError>()
                        .is_some_and(NetworkError::is_circuit_open);
                    let error = format!("{e:#}");
                    tracing::warn!(provider = %name, %error, "provider failed");
                    failures.push(ProviderFailure {
                        provider: name.clone(),
                        error: error.clone(),
                        circuit_open,
                    });
                    let event = if circuit_open {
                        ScanEvent::ProviderSkipped { provider: name }
                    } else {
                        ScanEvent::ProviderFailed {
                            provider: name,
                            error,
                        }
                    };
                    emit(events, event).await;
                }
            }
        }

        let report = ReconcileReport { results, failures };
        tracing::info!(
            matched = report.matched_count(),
            unmatched = report.unmatched_count(),
            "reconciliation complete"
        );
        emit(
            events,
            ScanEvent::Completed {
                matched: report.matched_count(),
                unmatched: report.unmatched_count(),
            },
        )
        .await;
        report
    }

    /// Enumerate, fingerprint and reconcile every folder in `addons_dir`.
    ///
    /// Fails only when the directory itself cannot be listed.
    pub async fn reconcile_directory(
        &self,
        fs: Arc<dyn AddonFs>,
        addons_dir: &Path,
        options: &ReconcileOptions,
        normalize_whitespace: bool,
        events: Option<&mpsc::Sender<ScanEvent>>,
    ) -> anyhow::Result<DirectoryReport> {
        let mut folders = list_addon_folders(fs.as_ref(), addons_dir, options.flavor).await?;
        fingerprint_folders(fs, &mut folders, &self.required_schemes(), normalize_whitespace).await;
        let report = self.reconcile(&folders, options, events).await;
        Ok(DirectoryReport { folders, report })
    }
}

async fn emit(events: Option<&mpsc::Sender<ScanEvent>>, event: ScanEvent) {
    if let Some(tx) = events
        && tx.send(event).await.is_err()
    {
        tracing::debug!("scan event receiver dropped");
    }
}
