//! Proposed add-on records built from accepted matches
//!
//! Several folders often belong to one remote add-on (a core folder plus
//! modules). Matches are grouped by provider and external id so that each
//! remote add-on is proposed once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::folder::AddonFolder;
use crate::provider::{MatchKind, MatchResult};
use crate::types::ReleaseChannel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAddon {
    pub provider: String,
    pub external_id: String,
    pub name: String,
    pub author: String,
    pub installed_version: Option<String>,
    pub installed_release_id: Option<String>,
    pub latest_version: Option<String>,
    pub latest_release_id: Option<String>,
    pub channel: ReleaseChannel,
    /// Never enabled for a freshly proposed add-on.
    pub auto_update: bool,
    pub installed_folders: Vec<String>,
    pub download_url: Option<String>,
    pub website_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub game_version: Option<String>,
    pub match_kind: MatchKind,
}

/// Build one proposal per matched remote add-on, in first-seen order.
///
/// Within a group, the folder that declares the most provider ids in its
/// manifest is used as the representative.
pub fn propose_addons(folders: &[AddonFolder], results: &[MatchResult]) -> Vec<ProposedAddon> {
    let by_name: HashMap<&str, &AddonFolder> =
        folders.iter().map(|f| (f.name.as_str(), f)).collect();

    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<&MatchResult>> = HashMap::new();
    for result in results.iter().filter(|r| r.is_matched()) {
        let (Some(provider), Some(id)) = (result.provider.clone(), result.external_id()) else {
            continue;
        };
        let key = (provider, id.to_string());
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(result);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let group = groups.remove(&key)?;
            let representative = group
                .iter()
                .copied()
                .enumerate()
                .max_by_key(|(i, r)| {
                    let declared = by_name
                        .get(r.folder_name.as_str())
                        .map(|f| declared_ids(f))
                        .unwrap_or(0);
                    (declared, std::cmp::Reverse(*i))
                })
                .map(|(_, r)| r)?;
            let (provider, external_id) = key;
            Some(build(provider, external_id, representative, &group, &by_name))
        })
        .collect()
}

fn declared_ids(folder: &AddonFolder) -> usize {
    folder.manifest.as_ref().map_or(0, |m| {
        [m.curse_project_id(), m.wowinterface_id(), m.wago_id()]
            .iter()
            .filter(|id| id.is_some())
            .count()
    })
}

fn build(
    provider: String,
    external_id: String,
    result: &MatchResult,
    group: &[&MatchResult],
    folders: &HashMap<&str, &AddonFolder>,
) -> ProposedAddon {
    let folder = folders.get(result.folder_name.as_str()).copied();
    let manifest = folder.and_then(|f| f.manifest.as_ref());
    let entry = result.entry.as_ref();

    let mut installed_folders = result
        .matched_release
        .as_ref()
        .map(|r| r.folder_names())
        .unwrap_or_default();
    for member in group {
        if !installed_folders.iter().any(|f| f.eq_ignore_ascii_case(&member.folder_name)) {
            installed_folders.push(member.folder_name.clone());
        }
    }
    installed_folders.sort_by_key(|f| f.to_lowercase());

    let author = match entry {
        Some(e) if !e.authors.is_empty() => e.author_line(),
        _ => manifest.and_then(|m| m.author.clone()).unwrap_or_default(),
    };

    ProposedAddon {
        name: entry
            .map(|e| e.name.clone())
            .unwrap_or_else(|| result.folder_name.clone()),
        author,
        installed_version: result
            .matched_release
            .as_ref()
            .map(|r| r.version.clone())
            .or_else(|| manifest.and_then(|m| m.version.clone())),
        installed_release_id: result.matched_release.as_ref().map(|r| r.id.clone()),
        latest_version: result.release.as_ref().map(|r| r.version.clone()),
        latest_release_id: result.release.as_ref().map(|r| r.id.clone()),
        channel: result.effective_channel.unwrap_or_default(),
        auto_update: false,
        installed_folders,
        download_url: result.release.as_ref().and_then(|r| r.download_url.clone()),
        website_url: entry.and_then(|e| e.website_url.clone()),
        thumbnail_url: entry.and_then(|e| e.thumbnail_url.clone()),
        game_version: result
            .matched_release
            .as_ref()
            .and_then(|r| r.game_version.clone())
            .or_else(|| manifest.and_then(|m| m.interface.clone())),
        match_kind: result.kind,
        provider,
        external_id,
    }
}
