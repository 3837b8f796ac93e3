//! Folder fingerprint scanner
//!
//! Resolves the identity-relevant files of an add-on folder by following
//! include directives from its manifest (and `Bindings.xml`), hashes each
//! resolved file, and hashes the sorted per-file hashes into one aggregate
//! fingerprint.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::hasher::ContentHasher;
use super::includes::{self, FileKind};
use crate::fs::AddonFs;
use crate::manifest::manifest_suffix;
use crate::types::Fingerprint;

/// Include chains deeper than this are not followed further.
pub const MAX_INCLUDE_DEPTH: usize = 32;

const BINDINGS_FILE: &str = "bindings.xml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub folder_name: String,
    pub path: PathBuf,
    /// Aggregate fingerprint; `None` when the folder has no manifest.
    pub fingerprint: Option<Fingerprint>,
    /// Resolved files, sorted case-insensitively.
    pub files: Vec<PathBuf>,
    /// One fingerprint per resolved file, in `files` order.
    pub file_fingerprints: Vec<Fingerprint>,
}

impl ScanResult {
    fn empty(folder_name: String, path: PathBuf) -> Self {
        Self {
            folder_name,
            path,
            fingerprint: None,
            files: Vec::new(),
            file_fingerprints: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprint.is_none()
    }
}

#[derive(Clone)]
pub struct FingerprintScanner {
    fs: Arc<dyn AddonFs>,
    hasher: Arc<dyn ContentHasher>,
    max_depth: usize,
}

impl std::fmt::Debug for FingerprintScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintScanner")
            .field("hasher", &self.hasher)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl FingerprintScanner {
    pub fn new(fs: Arc<dyn AddonFs>, hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            fs,
            hasher,
            max_depth: MAX_INCLUDE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// List the folder and scan it.
    pub async fn scan(&self, folder: &Path) -> anyhow::Result<ScanResult> {
        let files = self
            .fs
            .list_files(folder)
            .await
            .with_context(|| format!("Failed to list add-on folder: {}", folder.display()))?;
        self.scan_files(folder, &files).await
    }

    /// Scan a folder given its complete recursive file listing.
    pub async fn scan_files(&self, folder: &Path, files: &[PathBuf]) -> anyhow::Result<ScanResult> {
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Lowercase relative path -> real path, for case-sensitive filesystems.
        let lookup: HashMap<String, PathBuf> = files
            .iter()
            .filter_map(|path| relative_key(folder, path).map(|key| (key, path.clone())))
            .collect();

        let mut manifests: Vec<String> = lookup
            .keys()
            .filter(|key| !key.contains('/') && manifest_suffix(&folder_name, key).is_some())
            .cloned()
            .collect();
        if manifests.is_empty() {
            tracing::debug!(folder = %folder.display(), "no manifest, skipping");
            return Ok(ScanResult::empty(folder_name, folder.to_path_buf()));
        }
        manifests.sort();

        let mut roots = manifests;
        if lookup.contains_key(BINDINGS_FILE) {
            roots.push(BINDINGS_FILE.to_string());
        }

        let mut resolved = self.resolve_includes(folder, &lookup, roots).await?;
        resolved.sort_by_key(|path| path.to_string_lossy().to_lowercase());

        let mut file_fingerprints = Vec::with_capacity(resolved.len());
        for path in &resolved {
            let bytes = self
                .fs
                .read_bytes(path)
                .await
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            file_fingerprints.push(self.hasher.hash_file(&bytes));
        }

        let mut sorted = file_fingerprints.clone();
        sorted.sort();
        let concatenated: String = sorted.iter().map(ToString::to_string).collect();
        let fingerprint = self.hasher.hash_str(&concatenated);

        tracing::debug!(
            folder = %folder_name,
            files = resolved.len(),
            %fingerprint,
            "scanned folder"
        );

        Ok(ScanResult {
            folder_name,
            path: folder.to_path_buf(),
            fingerprint: Some(fingerprint),
            files: resolved,
            file_fingerprints,
        })
    }

    /// Depth-first include walk with a visited set local to this call.
    async fn resolve_includes(
        &self,
        folder: &Path,
        lookup: &HashMap<String, PathBuf>,
        roots: Vec<String>,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut resolved = Vec::new();
        let mut stack: Vec<(String, usize)> = roots.into_iter().rev().map(|k| (k, 0)).collect();

        while let Some((key, depth)) = stack.pop() {
            if visited.contains(&key) {
                continue;
            }
            let Some(actual) = lookup.get(&key) else {
                tracing::debug!(folder = %folder.display(), include = %key, "include not on disk");
                continue;
            };
            visited.insert(key.clone());
            resolved.push(actual.clone());

            let kind = FileKind::from_path(actual);
            if kind == FileKind::Other {
                continue;
            }
            if depth >= self.max_depth {
                tracing::warn!(file = %actual.display(), depth, "include depth limit reached");
                continue;
            }

            let text = self
                .fs
                .read_text(actual)
                .await
                .with_context(|| format!("Failed to read file: {}", actual.display()))?;
            let stripped = includes::strip_comments(kind, &text);
            let targets = includes::parse_includes(kind, &stripped);

            let base = key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            let mut children = Vec::with_capacity(targets.len());
            for target in targets {
                if let Err(reason) = includes::validate_include(&target) {
                    tracing::warn!(file = %actual.display(), include = %target, ?reason, "rejected include");
                    continue;
                }
                if let Some(child) = join_key(base, &target) {
                    children.push((child, depth + 1));
                }
            }
            stack.extend(children.into_iter().rev());
        }

        Ok(resolved)
    }
}

/// Lowercase, `/`-separated path of `path` relative to `folder`.
fn relative_key(folder: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(folder).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Resolve an include target against the including file's directory key.
fn join_key(base: &str, target: &str) -> Option<String> {
    let normalized = target.replace('\\', "/").to_lowercase();
    let parts: Vec<&str> = base
        .split('/')
        .chain(normalized.split('/'))
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_normalizes_separators() {
        assert_eq!(join_key("", "Libs\\LibStub.lua").as_deref(), Some("libs/libstub.lua"));
        assert_eq!(join_key("libs", "./Sub/x.XML").as_deref(), Some("libs/sub/x.xml"));
        assert_eq!(join_key("", ""), None);
    }

    #[test]
    fn relative_key_lowercases() {
        let folder = Path::new("/addons/MyAddon");
        assert_eq!(
            relative_key(folder, Path::new("/addons/MyAddon/Libs/Core.LUA")).as_deref(),
            Some("libs/core.lua")
        );
        assert_eq!(relative_key(folder, Path::new("/elsewhere/x.lua")), None);
    }
}
