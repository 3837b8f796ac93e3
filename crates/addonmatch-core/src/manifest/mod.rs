//! Add-on manifest (`.toc`) parsing
//!
//! A manifest is a text file of `## Key: Value` metadata lines followed by
//! the list of files the game loads. Only the metadata is parsed here; the
//! load list is handled by the fingerprint scanner.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::GameFlavor;

/// Flavor suffixes accepted on manifest file names (`Name_Classic.toc`,
/// `Name-Mainline.toc`).
pub const MANIFEST_SUFFIXES: &[&str] = &[
    "mainline", "bcc", "tbc", "classic", "vanilla", "wrath", "wotlkc", "cata", "mists",
];

pub const MANIFEST_EXTENSION: &str = "toc";

static COLOR_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|[cC][0-9a-fA-F]{8}|\|[rR]").expect("static regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// File name the manifest was read from, e.g. `MyAddon_Classic.toc`.
    pub file_name: String,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Declared game version (`## Interface`).
    pub interface: Option<String>,
    pub version: Option<String>,
    pub dependencies: Vec<String>,
    pub optional_dependencies: Vec<String>,
    /// Every metadata field, keyed by lowercase name.
    fields: BTreeMap<String, String>,
}

impl Manifest {
    /// Case-insensitive metadata lookup.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn curse_project_id(&self) -> Option<&str> {
        self.field("X-Curse-Project-ID")
    }

    pub fn wowinterface_id(&self) -> Option<&str> {
        self.field("X-WoWI-ID")
    }

    pub fn wago_id(&self) -> Option<&str> {
        self.field("X-Wago-ID")
    }

    /// `## X-Part-Of`: names the parent add-on of a multi-folder bundle.
    pub fn part_of(&self) -> Option<&str> {
        self.field("X-Part-Of")
    }
}

/// Parse manifest metadata from text.
pub fn parse_manifest(file_name: &str, text: &str) -> Manifest {
    let mut fields = BTreeMap::new();
    for line in text.lines() {
        let Some(rest) = line.trim_start().strip_prefix("##") else {
            continue;
        };
        let Some((key, value)) = rest.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        // First declaration wins.
        fields
            .entry(key)
            .or_insert_with(|| strip_color_codes(value.trim()));
    }

    let get = |key: &str| fields.get(key).filter(|v| !v.is_empty()).cloned();
    let list = |keys: &[&str]| -> Vec<String> {
        keys.iter()
            .filter_map(|k| fields.get(*k))
            .flat_map(|v| v.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    Manifest {
        file_name: file_name.to_string(),
        title: get("title"),
        author: get("author"),
        interface: get("interface"),
        version: get("version"),
        dependencies: list(&["dependencies", "requireddeps", "dep"]),
        optional_dependencies: list(&["optionaldeps"]),
        fields,
    }
}

fn strip_color_codes(value: &str) -> String {
    COLOR_CODE.replace_all(value, "").trim().to_string()
}

/// If `file_name` is a manifest for `folder_name`, return its flavor suffix
/// (`Some(None)` for the unsuffixed manifest). Comparison ignores case.
pub fn manifest_suffix(folder_name: &str, file_name: &str) -> Option<Option<String>> {
    let lower = file_name.to_ascii_lowercase();
    let stem = lower.strip_suffix(&format!(".{MANIFEST_EXTENSION}"))?;
    let rest = stem.strip_prefix(&folder_name.to_ascii_lowercase())?;
    if rest.is_empty() {
        return Some(None);
    }
    let suffix = rest.strip_prefix('-').or_else(|| rest.strip_prefix('_'))?;
    MANIFEST_SUFFIXES
        .contains(&suffix)
        .then(|| Some(suffix.to_string()))
}

/// Flavor suffixes that select a manifest for `flavor`.
pub fn suffixes_for_flavor(flavor: GameFlavor) -> &'static [&'static str] {
    match flavor {
        GameFlavor::Retail => &["mainline"],
        GameFlavor::Classic => &["classic", "vanilla"],
        GameFlavor::BurningCrusade => &["bcc", "tbc"],
        GameFlavor::Wrath => &["wrath", "wotlkc"],
    }
}

/// Pick the manifest file the game would load for `flavor`: a matching
/// flavor-suffixed file first, then the unsuffixed one.
pub fn select_manifest_file<'a>(
    folder_name: &str,
    candidates: &'a [String],
    flavor: GameFlavor,
) -> Option<&'a String> {
    let wanted = suffixes_for_flavor(flavor);
    let flavored = candidates.iter().find(|name| {
        matches!(manifest_suffix(folder_name, name), Some(Some(ref s)) if wanted.contains(&s.as_str()))
    });
    flavored.or_else(|| {
        candidates
            .iter()
            .find(|name| matches!(manifest_suffix(folder_name, name), Some(None)))
    })
}
