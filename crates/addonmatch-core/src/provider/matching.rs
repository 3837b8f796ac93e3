//! Exact and partial match classification
//!
//! Pure functions over a decoded fingerprint response. No I/O, so the
//! selection rules can be tested on their own.

use std::collections::HashSet;

use super::MatchKind;
use super::wire::{FingerprintResponse, WireMatch};
use crate::catalog::{CompatibilityFilter, ReleaseFile};
use crate::fingerprint::ScanResult;
use crate::types::Fingerprint;

/// A catalog record that claims one or more fingerprints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub addon_id: String,
    pub release: ReleaseFile,
}

/// Candidates of one batch response, split by how the catalog matched them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    pub exact: Vec<Candidate>,
    pub partial: Vec<Candidate>,
}

impl MatchSet {
    /// Build from the wire response, dropping records without a file or
    /// without modules.
    pub fn from_response(response: FingerprintResponse) -> Self {
        Self {
            exact: candidates(response.exact_matches),
            partial: candidates(response.partial_matches),
        }
    }
}

fn candidates(matches: Vec<WireMatch>) -> Vec<Candidate> {
    matches
        .into_iter()
        .filter_map(|m| {
            let addon_id = m.id.to_string();
            let Some(file) = m.file else {
                tracing::debug!(addon = %addon_id, "match without file ignored");
                return None;
            };
            let release = file.into_release()?;
            if release.modules.is_empty() {
                tracing::debug!(addon = %addon_id, "match without modules ignored");
                return None;
            }
            Some(Candidate { addon_id, release })
        })
        .collect()
}

/// Classify one scanned folder against a batch response.
///
/// Exact matches (a module carries the folder's aggregate fingerprint) win
/// over partial matches (a module carries any per-file fingerprint). Only
/// releases passing `filter` are considered. When several candidates
/// qualify, the first in catalog order is taken.
pub fn classify<'a>(
    scan: &ScanResult,
    matches: &'a MatchSet,
    filter: &CompatibilityFilter,
) -> (MatchKind, Option<&'a Candidate>) {
    let Some(aggregate) = scan.fingerprint.as_ref() else {
        return (MatchKind::Unmatched, None);
    };

    let exact: Vec<&Candidate> = matches
        .exact
        .iter()
        .filter(|c| filter.accepts(&c.release) && c.release.has_module_fingerprint(aggregate))
        .collect();
    if let Some(first) = exact.first() {
        warn_if_ambiguous(&scan.folder_name, &exact);
        return (MatchKind::ExactMatch, Some(*first));
    }

    let per_file: HashSet<&Fingerprint> = scan.file_fingerprints.iter().collect();
    let partial: Vec<&Candidate> = matches
        .partial
        .iter()
        .filter(|c| filter.accepts(&c.release))
        .filter(|c| c.release.modules.iter().any(|m| per_file.contains(&m.fingerprint)))
        .collect();
    if let Some(first) = partial.first() {
        warn_if_ambiguous(&scan.folder_name, &partial);
        return (MatchKind::PartialMatch, Some(*first));
    }

    (MatchKind::Unmatched, None)
}

fn warn_if_ambiguous(folder: &str, candidates: &[&Candidate]) {
    let ids: HashSet<&str> = candidates.iter().map(|c| c.addon_id.as_str()).collect();
    if ids.len() > 1 {
        let mut ids: Vec<&str> = ids.into_iter().collect();
        ids.sort_unstable();
        tracing::warn!(
            folder,
            candidates = %ids.join(", "),
            chosen = %candidates[0].addon_id,
            "fingerprint matches several add-ons"
        );
    }
}
