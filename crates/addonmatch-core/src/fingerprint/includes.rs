//! Include directive parsing for manifest and markup files.
//!
//! Comments are always stripped before directives are collected, so a
//! commented-out include is never followed.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static MARKUP_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));

static MARKUP_INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(?:Include|Script)\s+file\s*=\s*["']([^"']+)["']\s*/>"#)
        .expect("static regex")
});

/// How a resolved file is interpreted while following includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.toc`: one loaded file per non-comment line.
    Manifest,
    /// `.xml`: `<Include file=".."/>` and `<Script file=".."/>` tags.
    Markup,
    /// Anything else is hashed but never parsed.
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("toc") => FileKind::Manifest,
            Some("xml") => FileKind::Markup,
            _ => FileKind::Other,
        }
    }
}

pub fn strip_comments(kind: FileKind, text: &str) -> String {
    match kind {
        FileKind::Manifest => text
            .lines()
            .map(|line| match line.find('#') {
                Some(idx) => line[..idx].trim_end(),
                None => line,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        FileKind::Markup => MARKUP_COMMENT.replace_all(text, "").into_owned(),
        FileKind::Other => text.to_string(),
    }
}

/// Include targets declared in already comment-stripped text, in order.
pub fn parse_includes(kind: FileKind, text: &str) -> Vec<String> {
    match kind {
        FileKind::Manifest => text
            .lines()
            .map(str::trim)
            .filter(|line| {
                let lower = line.to_ascii_lowercase();
                lower.len() > 4 && (lower.ends_with(".lua") || lower.ends_with(".xml"))
            })
            .map(str::to_string)
            .collect(),
        FileKind::Markup => MARKUP_INCLUDE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        FileKind::Other => Vec::new(),
    }
}

/// Why an include target was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeRejection {
    ParentTraversal,
    InvalidCharacter,
}

/// Reject parent-directory traversal and control characters.
pub fn validate_include(target: &str) -> Result<(), IncludeRejection> {
    if target.contains("..") {
        return Err(IncludeRejection::ParentTraversal);
    }
    if target.chars().any(|c| c.is_control() || c == '|') {
        return Err(IncludeRejection::InvalidCharacter);
    }
    Ok(())
}
