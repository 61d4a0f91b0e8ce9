//! Configuration model for Symfold

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::symbol::SymbolKind;

/// Symfold configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SymfoldConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub lsp: LspConfig,

    #[serde(default)]
    pub correlation: CorrelationConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Language server process settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerSettings {
    /// Server executable; chosen from the file's language when unset
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// `languageId` override for `textDocument/didOpen`
    pub language_id: Option<String>,
}

/// LSP session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspConfig {
    /// Base per-call timeout; 0 waits indefinitely
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Send a `shutdown` request before `exit`
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::timeout_secs(),
            shutdown_timeout_secs: defaults::shutdown_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
        }
    }
}

/// Symbol/folding-region matching rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Added to a region's end line before comparing with the symbol's end line
    #[serde(default = "defaults::end_line_offset")]
    pub end_line_offset: i64,

    #[serde(default = "defaults::excluded_kinds")]
    pub excluded_kinds: Vec<SymbolKind>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            end_line_offset: defaults::end_line_offset(),
            excluded_kinds: defaults::excluded_kinds(),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable listings
    #[default]
    Text,
    /// Single JSON document
    Json,
}

mod defaults {
    use super::SymbolKind;

    pub fn timeout_secs() -> u64 {
        30
    }
    pub fn shutdown_timeout_secs() -> u64 {
        5
    }
    pub fn graceful_shutdown() -> bool {
        true
    }
    pub fn end_line_offset() -> i64 {
        1
    }
    pub fn excluded_kinds() -> Vec<SymbolKind> {
        vec![SymbolKind::Variable]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: SymfoldConfig = toml::from_str("").unwrap();
        assert_eq!(config.lsp.timeout_secs, 30);
        assert!(config.lsp.graceful_shutdown);
        assert_eq!(config.correlation.end_line_offset, 1);
        assert_eq!(config.correlation.excluded_kinds, vec![SymbolKind::Variable]);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.server.command.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: SymfoldConfig = toml::from_str(
            r#"
            [server]
            command = "pyright-langserver"
            args = ["--stdio"]

            [correlation]
            end_line_offset = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.command.as_deref(), Some("pyright-langserver"));
        assert_eq!(config.server.args, vec!["--stdio"]);
        assert_eq!(config.correlation.end_line_offset, 0);
        assert_eq!(config.correlation.excluded_kinds, vec![SymbolKind::Variable]);
        assert_eq!(config.lsp.shutdown_timeout_secs, 5);
    }

    #[test]
    fn test_output_format_values() {
        let config: SymfoldConfig = toml::from_str("[output]\nformat = \"json\"").unwrap();
        assert_eq!(config.output.format, OutputFormat::Json);

        let bad = toml::from_str::<SymfoldConfig>("[output]\nformat = \"yaml\"");
        assert!(bad.is_err());
    }
}
