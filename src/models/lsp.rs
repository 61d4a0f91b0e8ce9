//! LSP Common Types
//!
//! Positions, ranges, folding regions and URI helpers shared by the
//! protocol layer and the correlator.

use std::path::Path;

use serde::{Deserialize, Serialize};

// ============================================================================
// Core LSP Types
// ============================================================================

/// Position within a document (0-indexed, LSP standard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Range within a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Build a range from `[startLine, startChar, endLine, endChar]`
    pub fn from_bounds(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        Self {
            start: Position::new(start_line, start_char),
            end: Position::new(end_line, end_char),
        }
    }
}

// ============================================================================
// Folding Range Types
// ============================================================================

/// Foldable span reported by `textDocument/foldingRange`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldingRegion {
    /// Start line (0-indexed)
    pub start_line: u32,
    /// End line (0-indexed, inclusive)
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_character: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_character: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FoldingRangeKind>,
}

impl FoldingRegion {
    pub fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start_line,
            end_line,
            start_character: None,
            end_character: None,
            kind: None,
        }
    }
}

/// Folding range kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FoldingRangeKind {
    Comment,
    Imports,
    Region,
    #[default]
    #[serde(other)]
    Other,
}

impl std::fmt::Display for FoldingRangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Comment => write!(f, "comment"),
            Self::Imports => write!(f, "imports"),
            Self::Region => write!(f, "region"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ============================================================================
// Document Identity
// ============================================================================

/// The one text document a session has opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIdentity {
    pub uri: String,
    pub version: i32,
}

// ============================================================================
// URI Utilities
// ============================================================================

/// Convert file path to RFC 3986 compliant file:// URI
pub fn path_to_uri(path: &Path) -> String {
    let abs_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let path_str = abs_path.to_string_lossy().replace('\\', "/");
    let encoded: String = path_str
        .chars()
        .map(|c| match c {
            '/' | '.' | '-' | '_' | '~' => c.to_string(),
            c if c.is_ascii_alphanumeric() => c.to_string(),
            c => {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect();

    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        // Windows drive paths: file:///C%3A/...
        format!("file:///{encoded}")
    }
}

// ============================================================================
// Tests
// ============================================================================
