//! JSON wire formats of the supported catalogs and their conversion into
//! catalog records.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::catalog::{CatalogEntry, DependencyKind, ReleaseDependency, ReleaseFile, ReleaseModule};
use crate::types::{Fingerprint, GameFlavor, ReleaseChannel};

/// Catalog ids arrive as numbers from some endpoints and strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(u64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Number(n) => write!(f, "{n}"),
            WireId::Text(s) => f.write_str(s),
        }
    }
}

/// Decode catalog records one at a time. Records that do not decode are
/// dropped so a single sparse record cannot fail the whole response.
pub fn decode_records<T: DeserializeOwned>(values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed catalog record");
                None
            }
        })
        .collect()
}

/// A list field where `null`, a non-list or bad elements degrade instead
/// of failing the enclosing record.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(decode_records(items)),
        Value::Null => Ok(Vec::new()),
        other => {
            tracing::debug!(value = %other, "expected a list, ignoring field");
            Ok(Vec::new())
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize)]
pub struct FingerprintRequest<'a> {
    pub fingerprints: &'a [Fingerprint],
}

#[derive(Debug, Clone, Serialize)]
pub struct IdsRequest<'a> {
    pub ids: &'a [WireId],
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintResponse {
    #[serde(default, deserialize_with = "lenient_list")]
    pub exact_matches: Vec<WireMatch>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub partial_matches: Vec<WireMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMatch {
    pub id: WireId,
    #[serde(default)]
    pub file: Option<WireFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFile {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_release_type", deserialize_with = "null_as_default")]
    pub release_type: u8,
    #[serde(default)]
    pub game_version_flavor: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub game_version: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_alternate: bool,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub modules: Vec<WireModule>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub dependencies: Vec<WireDependency>,
}

fn default_release_type() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireModule {
    pub foldername: String,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDependency {
    pub addon_id: WireId,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAddon {
    pub id: WireId,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub download_count: f64,
    #[serde(default, deserialize_with = "lenient_list")]
    pub authors: Vec<WireAuthor>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub attachments: Vec<WireAttachment>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub latest_files: Vec<WireFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAuthor {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_default: bool,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Manifest-id catalog record (`filedetails/{ids}.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDetails {
    pub id: WireId,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub download_uri: Option<String>,
    #[serde(default)]
    pub downloads: Option<u64>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_update: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub images: Vec<WireImage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireImage {
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Catalog release type codes: 1 release, 2 beta, 3 alpha.
pub fn channel_from_release_type(release_type: u8) -> ReleaseChannel {
    match release_type {
        2 => ReleaseChannel::Beta,
        3 => ReleaseChannel::Alpha,
        _ => ReleaseChannel::Stable,
    }
}

fn dependency_kind(code: u8) -> DependencyKind {
    match code {
        1 => DependencyKind::Embedded,
        2 => DependencyKind::Optional,
        3 => DependencyKind::Required,
        _ => DependencyKind::Other,
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

impl WireFile {
    /// Convert to a release record.
    ///
    /// Files for a flavor this crate does not know are dropped: they can
    /// never be compatible with a supported client.
    pub fn into_release(self) -> Option<ReleaseFile> {
        let Some(id) = self.id else {
            tracing::debug!("dropping file without id");
            return None;
        };
        let flavor = match self.game_version_flavor.as_deref() {
            None | Some("") => None,
            Some(key) => match GameFlavor::from_catalog_key(key) {
                Some(flavor) => Some(flavor),
                None => {
                    tracing::debug!(file = %id, flavor = key, "dropping file for unknown flavor");
                    return None;
                }
            },
        };

        let id = id.to_string();
        Some(ReleaseFile {
            version: self.display_name.unwrap_or_else(|| id.clone()),
            id,
            channel: channel_from_release_type(self.release_type),
            download_url: self.download_url,
            released_at: self.file_date.as_deref().and_then(parse_date),
            flavor,
            game_version: self.game_version.into_iter().find(|v| !v.is_empty()),
            modules: self
                .modules
                .into_iter()
                .map(|m| ReleaseModule {
                    folder_name: m.foldername,
                    fingerprint: m.fingerprint,
                })
                .collect(),
            dependencies: self
                .dependencies
                .into_iter()
                .map(|d| ReleaseDependency {
                    addon_id: d.addon_id.to_string(),
                    kind: dependency_kind(d.kind),
                })
                .collect(),
            is_alternate: self.is_alternate,
        })
    }
}

impl From<WireAddon> for CatalogEntry {
    fn from(addon: WireAddon) -> Self {
        let thumbnail_url = addon
            .attachments
            .iter()
            .find(|a| a.is_default && a.thumbnail_url.is_some())
            .and_then(|a| a.thumbnail_url.clone());
        let screenshot_urls = addon
            .attachments
            .iter()
            .filter_map(|a| a.url.clone())
            .filter(|u| !u.is_empty())
            .collect();

        CatalogEntry {
            id: addon.id.to_string(),
            name: addon.name,
            authors: addon.authors.into_iter().map(|a| a.name).collect(),
            summary: addon.summary,
            website_url: addon.website_url,
            thumbnail_url,
            screenshot_urls,
            download_count: addon.download_count.max(0.0) as u64,
            releases: addon
                .latest_files
                .into_iter()
                .filter_map(WireFile::into_release)
                .collect(),
        }
    }
}

impl WireDetails {
    /// Entry with a single stable release. `website_base` is the prefix of
    /// the add-on's public page, when the catalog has one.
    pub fn into_entry(self, website_base: Option<&str>) -> CatalogEntry {
        let id = self.id.to_string();
        let released_at = self
            .last_update
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        let release = ReleaseFile {
            id: id.clone(),
            channel: ReleaseChannel::Stable,
            version: self.version.unwrap_or_default(),
            download_url: self.download_uri,
            released_at,
            flavor: None,
            game_version: None,
            modules: Vec::new(),
            dependencies: Vec::new(),
            is_alternate: false,
        };

        CatalogEntry {
            website_url: website_base.map(|base| format!("{}/info{id}", base.trim_end_matches('/'))),
            id,
            name: self.title,
            authors: self.author.into_iter().filter(|a| !a.is_empty()).collect(),
            summary: self.description,
            thumbnail_url: self.images.first().and_then(|i| i.thumb_url.clone()),
            screenshot_urls: self.images.into_iter().filter_map(|i| i.image_url).collect(),
            download_count: self.downloads.unwrap_or(0),
            releases: vec![release],
        }
    }
}
