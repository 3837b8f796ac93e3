//! Release selection for a preferred stability channel
//!
//! Releases at or below the preferred strictness win, newest first. When
//! none exist the newest release of any channel is used instead, and the
//! reported channel becomes that release's real channel. An add-on is
//! never shown as "no update" just because its preferred channel is empty.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, ReleaseFile};
use crate::types::ReleaseChannel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSelection {
    pub release: ReleaseFile,
    /// Channel the selection actually comes from.
    pub effective_channel: ReleaseChannel,
    /// True when nothing matched the preference and any channel was used.
    pub fell_back: bool,
}

/// Pick the release to install from `entry` for `preferred`.
pub fn select_release(entry: &CatalogEntry, preferred: ReleaseChannel) -> Option<ReleaseSelection> {
    let selection = select_from(&entry.releases, preferred)?;
    if selection.fell_back {
        tracing::warn!(
            addon = %entry.name,
            id = %entry.id,
            %preferred,
            effective = %selection.effective_channel,
            "no release on preferred channel, falling back"
        );
    }
    Some(selection)
}

/// Same policy over a bare release list.
pub fn select_from(releases: &[ReleaseFile], preferred: ReleaseChannel) -> Option<ReleaseSelection> {
    let newest_first = newest_first(releases);

    if let Some(release) = newest_first
        .iter()
        .find(|r| r.channel.satisfies(preferred))
    {
        return Some(ReleaseSelection {
            release: (*release).clone(),
            effective_channel: preferred,
            fell_back: false,
        });
    }

    newest_first.first().map(|release| ReleaseSelection {
        release: (*release).clone(),
        effective_channel: release.channel,
        fell_back: true,
    })
}

/// Newest first; ties keep catalog order and undated releases go last.
fn newest_first(releases: &[ReleaseFile]) -> Vec<&ReleaseFile> {
    let mut ordered: Vec<&ReleaseFile> = releases.iter().collect();
    ordered.sort_by_key(|r| (r.released_at.is_none(), Reverse(r.released_at)));
    ordered
}
