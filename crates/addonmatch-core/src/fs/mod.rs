//! Filesystem collaborator used by folder enumeration and scanning.
//!
//! "Not found" degrades to an empty listing; every other I/O failure is
//! surfaced to the caller.

pub mod local;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use local::LocalFs;

#[async_trait]
pub trait AddonFs: Send + Sync + std::fmt::Debug {
    /// All regular files below `dir`, recursively, in sorted order.
    async fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Immediate subdirectories of `dir`, in sorted order.
    async fn list_dirs(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Whether `path` exists as a file or directory. Errors read as absent.
    async fn exists(&self, path: &Path) -> bool;

    /// File contents as text. Invalid UTF-8 is replaced, not rejected.
    async fn read_text(&self, path: &Path) -> io::Result<String>;

    async fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;
}
