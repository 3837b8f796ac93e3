//! Config store round trips on disk.

use addonmatch_core::config::{ConfigStore, ProviderKind};
use addonmatch_core::types::{GameFlavor, ReleaseChannel};
use tempfile::TempDir;

#[test]
fn missing_file_loads_defaults() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path());

    let config = store.load().unwrap();

    assert_eq!(config.scan.flavor, GameFlavor::Retail);
    assert_eq!(config.scan.channel, ReleaseChannel::Stable);
    assert!(config.scan.normalize_whitespace);
    assert_eq!(config.network.failure_threshold, 5);
    let names: Vec<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["curseforge", "wowinterface"]);
    assert!(!store.config_path().exists());
}

#[test]
fn save_then_load() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path().join("nested"));

    let mut config = store.load().unwrap();
    config.scan.flavor = GameFlavor::Classic;
    config.scan.channel = ReleaseChannel::Beta;
    config.network.cache_ttl_secs = 120;
    config.providers.retain(|p| p.kind == ProviderKind::ManifestId);
    store.save(&config).unwrap();

    assert!(store.config_path().exists());
    let loaded = store.load().unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn invalid_config_is_not_saved() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path());

    let mut config = store.load().unwrap();
    config.network.failure_threshold = 0;

    assert!(store.save(&config).is_err());
    assert!(!store.config_path().exists());
}

#[test]
fn parse_errors_name_the_file() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path());
    std::fs::write(store.config_path(), "[scan]\nchannel = \"nightly\"\n").unwrap();

    let err = store.load().unwrap_err();

    assert!(format!("{err:#}").contains("addonmatch.toml"));
}
