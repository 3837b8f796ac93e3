//! addonmatch core library
//!
//! Matches locally installed add-on folders against remote catalogs:
//! content fingerprints, exact and partial match classification, release
//! channel selection, and the resilient networking every catalog call
//! goes through.

pub mod catalog;
pub mod channel;
pub mod config;
pub mod context;
pub mod fingerprint;
pub mod folder;
pub mod fs;
pub mod manifest;
pub mod net;
pub mod proposal;
pub mod provider;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{AddonmatchConfig, ConfigStore, ProviderConfigEntry, ProviderKind};
    pub use crate::context::AppContext;

    // Scanning
    pub use crate::fingerprint::{ContentHasher, FingerprintScanner, FingerprintScheme, ScanResult};
    pub use crate::folder::{AddonFolder, IgnoreReason};
    pub use crate::fs::{AddonFs, LocalFs};
    pub use crate::manifest::Manifest;

    // Catalogs and matching
    pub use crate::catalog::{CatalogEntry, CompatibilityFilter, ReleaseFile};
    pub use crate::channel::{ReleaseSelection, select_release};
    pub use crate::proposal::{ProposedAddon, propose_addons};
    pub use crate::provider::{
        AddonProvider, MatchKind, MatchResult, ProviderCapabilities, ProviderRegistry,
        ReconcileOptions, ReconcileReport, ScanEvent,
    };

    // Networking
    pub use crate::net::{CatalogClient, CircuitBreaker, CircuitState, NetworkConfig, NetworkError};

    // Shared types
    pub use crate::types::{Fingerprint, GameFlavor, ReleaseChannel};
}
