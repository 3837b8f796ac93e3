//! Reconciliation passes over several providers.

mod support;

use std::sync::{Arc, Mutex, Weak};

use addonmatch_core::catalog::CatalogEntry;
use addonmatch_core::fingerprint::{FingerprintScheme, ScanResult};
use addonmatch_core::folder::{AddonFolder, IgnoreReason};
use addonmatch_core::manifest::parse_manifest;
use addonmatch_core::net::HttpMethod;
use addonmatch_core::provider::{
    AddonProvider, FingerprintCatalogProvider, MatchKind, MatchResult, ProviderCapabilities,
    ProviderRegistry, ReconcileOptions, ScanEvent,
};
use addonmatch_core::types::{Fingerprint, GameFlavor, ReleaseChannel};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use support::{FakeTransport, Reply, client, network_config};

/// Provider that matches a fixed set of folder names and records what it
/// was offered.
#[derive(Debug)]
struct StubProvider {
    name: String,
    matches: Vec<String>,
    failure: Option<String>,
    offered: Mutex<Vec<Vec<String>>>,
    /// Provider to enable or disable from inside the next `scan`.
    toggle: Mutex<Option<(Weak<ProviderRegistry>, String, bool)>>,
}

impl StubProvider {
    fn matching(name: &str, folders: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            matches: folders.iter().map(|f| f.to_string()).collect(),
            failure: None,
            offered: Mutex::new(Vec::new()),
            toggle: Mutex::new(None),
        })
    }

    fn failing(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            matches: Vec::new(),
            failure: Some(message.to_string()),
            offered: Mutex::new(Vec::new()),
            toggle: Mutex::new(None),
        })
    }

    fn offered(&self) -> Vec<Vec<String>> {
        self.offered.lock().unwrap().clone()
    }

    fn toggle_during_scan(&self, registry: &Arc<ProviderRegistry>, name: &str, enabled: bool) {
        *self.toggle.lock().unwrap() = Some((Arc::downgrade(registry), name.to_string(), enabled));
    }
}

#[async_trait]
impl AddonProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn fingerprint_scheme(&self) -> Option<FingerprintScheme> {
        None
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn scan(
        &self,
        folders: &[&AddonFolder],
        _options: &ReconcileOptions,
    ) -> anyhow::Result<Vec<MatchResult>> {
        self.offered
            .lock()
            .unwrap()
            .push(folders.iter().map(|f| f.name.clone()).collect());
        let toggle = self.toggle.lock().unwrap().take();
        if let Some((registry, name, enabled)) = toggle
            && let Some(registry) = registry.upgrade()
        {
            registry.set_enabled(&name, enabled)?;
        }
        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }
        Ok(folders
            .iter()
            .map(|f| {
                if self.matches.contains(&f.name) {
                    MatchResult {
                        folder_name: f.name.clone(),
                        kind: MatchKind::ExactMatch,
                        provider: Some(self.name.clone()),
                        ..MatchResult::default()
                    }
                } else {
                    MatchResult::unmatched(&f.name)
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

    async fn get_by_id(&self, _id: &str) -> anyhow::Result<Option<CatalogEntry>> {
        Ok(None)
    }

    async fn get_all(&self, _ids: &[String]) -> anyhow::Result<Vec<CatalogEntry>> {
        Ok(Vec::new())
    }
}

fn folder(name: &str) -> AddonFolder {
    AddonFolder::new(name, format!("/addons/{name}"))
        .with_manifest(parse_manifest(&format!("{name}.toc"), "## Title: x\n"))
}

fn options() -> ReconcileOptions {
    ReconcileOptions::new(GameFlavor::Retail, ReleaseChannel::Stable)
}

fn registry(providers: Vec<Arc<dyn AddonProvider>>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider).unwrap();
    }
    registry
}

fn drain(mut rx: mpsc::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn first_provider_to_match_wins() {
    let first = StubProvider::matching("first", &["Foo"]);
    let second = StubProvider::matching("second", &["Foo", "Bar"]);
    let registry = registry(vec![first.clone(), second.clone()]);
    let folders = vec![folder("Foo"), folder("Bar"), folder("Baz")];

    let report = registry.reconcile(&folders, &options(), None).await;

    let providers: Vec<Option<&str>> = report
        .results
        .iter()
        .map(|r| r.provider.as_deref())
        .collect();
    assert_eq!(providers, vec![Some("first"), Some("second"), None]);
    assert_eq!(first.offered(), vec![vec!["Foo", "Bar", "Baz"]]);
    assert_eq!(second.offered(), vec![vec!["Bar", "Baz"]]);
    assert_eq!(report.matched_count(), 2);
    assert_eq!(report.unmatched_count(), 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn stops_once_everything_is_matched() {
    let first = StubProvider::matching("first", &["Foo", "Bar"]);
    let second = StubProvider::matching("second", &["Foo"]);
    let registry = registry(vec![first, second.clone()]);

    let report = registry
        .reconcile(&[folder("Foo"), folder("Bar")], &options(), None)
        .await;

    assert_eq!(report.matched_count(), 2);
    assert!(second.offered().is_empty());
}

#[tokio::test]
async fn provider_failure_is_isolated() {
    let broken = StubProvider::failing("broken", "catalog exploded");
    let healthy = StubProvider::matching("healthy", &["Foo"]);
    let registry = registry(vec![broken, healthy]);
    let (tx, rx) = mpsc::channel(64);

    let report = registry
        .reconcile(&[folder("Foo"), folder("Bar")], &options(), Some(&tx))
        .await;
    drop(tx);

    assert_eq!(report.results[0].provider.as_deref(), Some("healthy"));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].provider, "broken");
    assert!(!report.failures[0].circuit_open);
    assert!(report.failures[0].error.contains("catalog exploded"));

    let events = drain(rx);
    assert!(events.contains(&ScanEvent::ProviderFailed {
        provider: "broken".to_string(),
        error: "catalog exploded".to_string(),
    }));
}

#[tokio::test]
async fn events_follow_pass_order() {
    let first = StubProvider::matching("first", &["Foo"]);
    let second = StubProvider::matching("second", &[]);
    let registry = registry(vec![first, second]);
    let (tx, rx) = mpsc::channel(64);

    registry
        .reconcile(&[folder("Foo"), folder("Bar")], &options(), Some(&tx))
        .await;
    drop(tx);

    assert_eq!(
        drain(rx),
        vec![
            ScanEvent::Started { folders: 2, providers: 2 },
            ScanEvent::ProviderStarted { provider: "first".to_string(), folders: 2 },
            ScanEvent::ProviderFinished { provider: "first".to_string(), matched: 1 },
            ScanEvent::ProviderStarted { provider: "second".to_string(), folders: 1 },
            ScanEvent::ProviderFinished { provider: "second".to_string(), matched: 0 },
            ScanEvent::Completed { matched: 1, unmatched: 1 },
        ]
    );
}

#[tokio::test]
async fn dropped_event_receiver_does_not_abort() {
    let registry = registry(vec![StubProvider::matching("only", &["Foo"])]);
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let report = registry.reconcile(&[folder("Foo")], &options(), Some(&tx)).await;

    assert_eq!(report.matched_count(), 1);
}

#[tokio::test]
async fn disabled_provider_is_not_called() {
    let off = StubProvider::matching("off", &["Foo"]);
    let on = StubProvider::matching("on", &["Foo"]);
    let registry = registry(vec![off.clone(), on]);

    registry.set_enabled("off", false).unwrap();
    assert!(registry.set_enabled("missing", false).is_err());
    assert!(!registry.is_enabled("off"));

    let report = registry.reconcile(&[folder("Foo")], &options(), None).await;

    assert!(off.offered().is_empty());
    assert_eq!(report.results[0].provider.as_deref(), Some("on"));
}

#[tokio::test]
async fn disabling_mid_pass_keeps_the_running_snapshot() {
    let first = StubProvider::matching("first", &["Foo"]);
    let late = StubProvider::matching("late", &["Bar"]);
    let registry = Arc::new(registry(vec![first.clone(), late.clone()]));
    first.toggle_during_scan(&registry, "late", false);

    let report = registry
        .reconcile(&[folder("Foo"), folder("Bar")], &options(), None)
        .await;

    assert!(!registry.is_enabled("late"));
    assert_eq!(late.offered(), vec![vec!["Bar".to_string()]]);
    assert_eq!(report.results[1].provider.as_deref(), Some("late"));

    let next = registry.reconcile(&[folder("Bar")], &options(), None).await;
    assert_eq!(late.offered().len(), 1);
    assert!(!next.results[0].is_matched());
}

#[tokio::test]
async fn enabling_mid_pass_waits_for_the_next_pass() {
    let first = StubProvider::matching("first", &[]);
    let late = StubProvider::matching("late", &["Foo"]);
    let registry = Arc::new(registry(vec![first.clone(), late.clone()]));
    registry.set_enabled("late", false).unwrap();
    first.toggle_during_scan(&registry, "late", true);

    let report = registry.reconcile(&[folder("Foo")], &options(), None).await;

    assert!(registry.is_enabled("late"));
    assert!(late.offered().is_empty());
    assert!(!report.results[0].is_matched());

    let next = registry.reconcile(&[folder("Foo")], &options(), None).await;
    assert_eq!(next.results[0].provider.as_deref(), Some("late"));
}

#[tokio::test]
async fn unmatchable_folders_are_never_offered() {
    let stub = StubProvider::matching("stub", &["Git", "Bare", "Real"]);
    let registry = registry(vec![stub.clone()]);
    let mut git = folder("Git");
    git.ignore_reason = Some(IgnoreReason::GitRepository);
    let bare = AddonFolder::new("Bare", "/addons/Bare");

    let report = registry
        .reconcile(&[git, bare, folder("Real")], &options(), None)
        .await;

    assert_eq!(stub.offered(), vec![vec!["Real"]]);
    let kinds: Vec<MatchKind> = report.results.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![MatchKind::Unmatched, MatchKind::Unmatched, MatchKind::ExactMatch]
    );
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let mut registry = ProviderRegistry::new();
    registry.register(StubProvider::matching("dup", &[])).unwrap();
    assert!(registry.register(StubProvider::matching("dup", &[])).is_err());
    assert_eq!(registry.names(), vec!["dup"]);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_is_skipped_without_network() {
    let transport = FakeTransport::new();
    transport.route(HttpMethod::Post, "/fingerprint", Reply::Status(503));
    let catalog = FingerprintCatalogProvider::new(
        "catalog",
        "https://catalog.test/api",
        FingerprintScheme::Murmur2,
        client("catalog", Arc::clone(&transport), network_config(1)),
    )
    .unwrap();
    let fallback = StubProvider::matching("fallback", &["Foo"]);
    let registry = registry(vec![Arc::new(catalog), fallback]);

    let scan = ScanResult {
        folder_name: "Foo".to_string(),
        path: "/addons/Foo".into(),
        fingerprint: Some(Fingerprint::Numeric(7)),
        files: Vec::new(),
        file_fingerprints: Vec::new(),
    };
    let folders = vec![folder("Foo").with_scan(FingerprintScheme::Murmur2, scan)];

    // The first pass trips the breaker.
    let first = registry.reconcile(&folders, &options(), None).await;
    assert_eq!(first.failures.len(), 1);
    assert!(!first.failures[0].circuit_open);
    assert_eq!(transport.calls(), 1);

    let (tx, rx) = mpsc::channel(64);
    let second = registry.reconcile(&folders, &options(), Some(&tx)).await;
    drop(tx);

    assert_eq!(transport.calls(), 1);
    assert!(second.failures[0].circuit_open);
    assert_eq!(second.results[0].provider.as_deref(), Some("fallback"));
    assert!(drain(rx).contains(&ScanEvent::ProviderSkipped {
        provider: "catalog".to_string(),
    }));
}

#[tokio::test]
async fn reconcile_directory_with_manifest_id_provider() {
    let temp = tempfile::TempDir::new().unwrap();
    support::write_file(temp.path(), "Declared/Declared.toc", "## Title: Declared\n## X-WoWI-ID: 55\n");
    support::write_file(temp.path(), "Unknown/Unknown.toc", "## Title: Unknown\n");

    let transport = FakeTransport::new();
    transport.route(
        HttpMethod::Get,
        "/filedetails/55.json",
        Reply::Json(json!([{"id": "55", "title": "Declared", "version": "3.1"}])),
    );
    let provider = addonmatch_core::provider::ManifestIdProvider::new(
        "wowi",
        "https://ids.test/v4/game/WOW",
        "X-WoWI-ID",
        client("wowi", Arc::clone(&transport), network_config(5)),
    )
    .unwrap();
    let registry = registry(vec![Arc::new(provider)]);

    let directory = registry
        .reconcile_directory(
            Arc::new(addonmatch_core::fs::LocalFs),
            temp.path(),
            &options(),
            true,
            None,
        )
        .await
        .unwrap();

    assert_eq!(directory.folders.len(), 2);
    let declared = &directory.report.results[0];
    assert_eq!(declared.folder_name, "Declared");
    assert_eq!(declared.latest_version(), Some("3.1"));
    assert_eq!(directory.report.results[1].kind, MatchKind::Unmatched);
}
