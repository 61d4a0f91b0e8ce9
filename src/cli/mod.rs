//! CLI module for Symfold
//!
//! Provides command-line interface using clap derive macros.

pub mod output;

pub use output::OutputContext;

use std::path::PathBuf;

use clap::Parser;

use crate::models::config::{OutputFormat, SymfoldConfig};

const LONG_ABOUT: &str = r#"
Symfold - symbol and folding-region extraction over LSP

Starts a language server for the given file, asks it for the file's document
symbols and folding ranges, and pairs each symbol with the folding region
that covers its body.

EXAMPLES:
  symfold sample.py
  symfold src/lib.rs --format json
  symfold app.py --server pyright-langserver --server-arg=--stdio

CONFIGURATION:
  ~/.config/symfold/config.toml     global settings
  .symfold/config.toml              project settings (current directory)
  SYMFOLD_SERVER, SYMFOLD_LSP_TIMEOUT, SYMFOLD_OUTPUT_FORMAT
"#;

/// Symfold - symbol and folding-region extraction over LSP
#[derive(Parser, Debug)]
#[command(name = "symfold")]
#[command(author, version, about, long_about = LONG_ABOUT)]
pub struct Cli {
    /// Source file to analyze
    pub file: Option<PathBuf>,

    /// Language server executable (default: chosen from the file extension)
    #[arg(long, value_name = "CMD")]
    pub server: Option<String>,

    /// Argument passed to the language server (repeatable)
    #[arg(long = "server-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub server_args: Vec<String>,

    /// languageId sent with textDocument/didOpen
    #[arg(long, value_name = "ID")]
    pub language_id: Option<String>,

    /// Per-request timeout in seconds (0 waits indefinitely)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Verbose output (show debug info)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Flags take precedence over every other configuration source
    pub fn apply_overrides(&self, config: &mut SymfoldConfig) {
        if let Some(server) = &self.server {
            config.server.command = Some(server.clone());
            config.server.args = self.server_args.clone();
        } else if !self.server_args.is_empty() {
            config.server.args = self.server_args.clone();
        }
        if let Some(language_id) = &self.language_id {
            config.server.language_id = Some(language_id.clone());
        }
        if let Some(timeout) = self.timeout {
            config.lsp.timeout_secs = timeout;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_invocation() {
        let cli = Cli::try_parse_from([
            "symfold",
            "sample.py",
            "--server",
            "pyright-langserver",
            "--server-arg",
            "--stdio",
            "--language-id",
            "python",
            "--format",
            "json",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.file, Some(PathBuf::from("sample.py")));
        assert_eq!(cli.server.as_deref(), Some("pyright-langserver"));
        assert_eq!(cli.server_args, vec!["--stdio"]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert!(cli.verbose);
    }

    #[test]
    fn test_file_is_optional() {
        let cli = Cli::try_parse_from(["symfold"]).unwrap();
        assert!(cli.file.is_none());
        assert!(cli.format.is_none());
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["symfold", "a.py", "--format", "yaml"]).is_err());
    }

    #[test]
    fn test_overrides_replace_configured_server() {
        let mut config = SymfoldConfig::default();
        config.server.command = Some("pylsp".to_string());
        config.server.args = vec!["-v".to_string()];

        let cli = Cli::try_parse_from([
            "symfold",
            "a.py",
            "--server",
            "jedi-language-server",
            "--timeout",
            "0",
            "--format",
            "json",
        ])
        .unwrap();
        cli.apply_overrides(&mut config);

        assert_eq!(config.server.command.as_deref(), Some("jedi-language-server"));
        assert!(config.server.args.is_empty());
        assert_eq!(config.lsp.timeout_secs, 0);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = SymfoldConfig::default();
        config.server.command = Some("pylsp".to_string());
        config.lsp.timeout_secs = 12;

        Cli::try_parse_from(["symfold", "a.py"])
            .unwrap()
            .apply_overrides(&mut config);

        assert_eq!(config.server.command.as_deref(), Some("pylsp"));
        assert_eq!(config.lsp.timeout_secs, 12);
        assert_eq!(config.output.format, OutputFormat::Text);
    }
}
