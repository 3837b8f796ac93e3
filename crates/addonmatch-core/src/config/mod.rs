//! Configuration file handling
//!
//! - `schema`: the `addonmatch.toml` structure, defaults and validation
//! - `parser`: TOML parsing with line context on errors
//! - `store`: locating, loading and saving the file

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_config_file, parse_config_str, to_toml};
pub use schema::{AddonmatchConfig, NetworkSection, ProviderConfigEntry, ProviderKind, ScanSection};
pub use store::{CONFIG_FILE_NAME, ConfigStore};
