//! Add-on folder enumeration
//!
//! Lists the add-on folders under an add-ons directory, attaches the
//! manifest the game would load for the target flavor and marks folders
//! that must never be matched (git checkouts).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{FingerprintScanner, FingerprintScheme, ScanResult};
use crate::fs::AddonFs;
use crate::manifest::{Manifest, manifest_suffix, parse_manifest, select_manifest_file};
use crate::types::{Fingerprint, GameFlavor};

/// Why a folder is excluded from matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IgnoreReason {
    /// The folder is a git working copy managed by its developer.
    GitRepository,
}

/// One installed add-on folder. Lives for a single reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonFolder {
    pub name: String,
    pub path: PathBuf,
    /// Manifest selected for the target flavor.
    pub manifest: Option<Manifest>,
    /// Every manifest file name found at the folder root.
    pub manifest_files: Vec<String>,
    /// Recursive file listing, captured once at enumeration.
    pub files: Vec<PathBuf>,
    /// Scan results keyed by fingerprint scheme.
    pub scans: HashMap<FingerprintScheme, ScanResult>,
    pub ignore_reason: Option<IgnoreReason>,
}

impl AddonFolder {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest_files.push(manifest.file_name.clone());
        self.manifest = Some(manifest);
        self
    }

    pub fn with_scan(mut self, scheme: FingerprintScheme, scan: ScanResult) -> Self {
        self.scans.insert(scheme, scan);
        self
    }

    pub fn scan(&self, scheme: FingerprintScheme) -> Option<&ScanResult> {
        self.scans.get(&scheme)
    }

    /// Aggregate fingerprint under `scheme`, if the folder was scanned.
    pub fn fingerprint(&self, scheme: FingerprintScheme) -> Option<&Fingerprint> {
        self.scan(scheme).and_then(|s| s.fingerprint.as_ref())
    }

    /// Whether this folder may be offered to providers at all.
    pub fn is_matchable(&self) -> bool {
        self.ignore_reason.is_none() && self.manifest.is_some()
    }

    /// Manifest title, falling back to the folder name.
    pub fn display_name(&self) -> &str {
        self.manifest
            .as_ref()
            .and_then(|m| m.title.as_deref())
            .unwrap_or(&self.name)
    }
}

/// Enumerate add-on folders in `addons_dir`, sorted by name.
///
/// A missing directory yields no folders. Any other listing failure is
/// fatal for the pass. Problems inside a single folder only leave that
/// folder without a manifest.
pub async fn list_addon_folders(
    fs: &dyn AddonFs,
    addons_dir: &Path,
    flavor: GameFlavor,
) -> anyhow::Result<Vec<AddonFolder>> {
    let dirs = fs
        .list_dirs(addons_dir)
        .await
        .with_context(|| format!("Failed to list add-ons directory: {}", addons_dir.display()))?;

    let mut folders = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        match load_folder(fs, &dir, &name, flavor).await {
            Ok(folder) => folders.push(folder),
            Err(e) => {
                tracing::warn!(folder = %name, error = %format!("{e:#}"), "failed to read add-on folder");
                folders.push(AddonFolder::new(name, dir));
            }
        }
    }

    tracing::debug!(dir = %addons_dir.display(), count = folders.len(), "listed add-on folders");
    Ok(folders)
}

async fn load_folder(
    fs: &dyn AddonFs,
    path: &Path,
    name: &str,
    flavor: GameFlavor,
) -> anyhow::Result<AddonFolder> {
    let mut folder = AddonFolder::new(name, path);

    // A worktree or submodule checkout has a `.git` file instead of a directory.
    if fs.exists(&path.join(".git")).await {
        folder.ignore_reason = Some(IgnoreReason::GitRepository);
    }

    folder.files = fs.list_files(path).await?;
    folder.manifest_files = folder
        .files
        .iter()
        .filter(|f| f.parent() == Some(path))
        .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|n| manifest_suffix(name, n).is_some())
        .collect();
    folder.manifest_files.sort_by_key(|n| n.to_lowercase());

    if let Some(file_name) = select_manifest_file(name, &folder.manifest_files, flavor) {
        let manifest_path = path.join(file_name);
        let text = fs
            .read_text(&manifest_path)
            .await
            .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
        folder.manifest = Some(parse_manifest(file_name, &text));
    }

    Ok(folder)
}

/// Compute a scan result for every matchable folder under each scheme.
///
/// A folder that fails to scan is logged and left without a result for
/// that scheme, which leaves it unmatched by providers using it.
pub async fn fingerprint_folders(
    fs: Arc<dyn AddonFs>,
    folders: &mut [AddonFolder],
    schemes: &[FingerprintScheme],
    normalize_whitespace: bool,
) {
    for scheme in schemes {
        let scanner = FingerprintScanner::new(Arc::clone(&fs), scheme.hasher(normalize_whitespace));
        for folder in folders.iter_mut().filter(|f| f.is_matchable()) {
            match scanner.scan_files(&folder.path, &folder.files).await {
                Ok(scan) => {
                    folder.scans.insert(*scheme, scan);
                }
                Err(e) => {
                    tracing::warn!(
                        folder = %folder.name,
                        %scheme,
                        error = %format!("{e:#}"),
                        "failed to fingerprint folder"
                    );
                }
            }
        }
    }
}
