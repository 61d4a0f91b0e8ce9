//! Single-file analysis pipeline
//!
//! initialize → didOpen → foldingRange → documentSymbol → correlate → teardown

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::correlate::{CorrelationRule, correlate};
use crate::config::RuntimeConfig;
use crate::error::SymfoldResult;
use crate::infra::lsp::LspClient;
use crate::models::config::SymfoldConfig;
use crate::models::lsp::FoldingRegion;
use crate::models::symbol::{CorrelatedElement, Language, SymbolEntry};

/// Everything one analysis run produced, in server order
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub symbols: Vec<SymbolEntry>,
    pub folding_ranges: Vec<FoldingRegion>,
    pub correlated: Vec<CorrelatedElement>,
}

/// Resolved server invocation for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub command: String,
    pub args: Vec<String>,
    pub language_id: String,
}

impl ServerCommand {
    /// Configured command wins; otherwise the language default with its arguments
    pub fn resolve(config: &SymfoldConfig, language: Language) -> Self {
        let (command, args) = match &config.server.command {
            Some(command) => (command.clone(), config.server.args.clone()),
            None => {
                let (command, args) = language.default_server();
                (
                    command.to_string(),
                    args.iter().map(|a| a.to_string()).collect(),
                )
            }
        };
        let language_id = config
            .server
            .language_id
            .clone()
            .unwrap_or_else(|| language.language_id().to_string());

        Self {
            command,
            args,
            language_id,
        }
    }
}

pub struct AnalysisService {
    config: SymfoldConfig,
    rule: CorrelationRule,
}

impl AnalysisService {
    pub fn new(config: SymfoldConfig) -> Self {
        let rule = CorrelationRule::from(&config.correlation);
        Self { config, rule }
    }

    /// Spawn a server for `path`, run the pipeline, and always tear it down
    pub async fn analyze_file(&self, path: &Path) -> SymfoldResult<AnalysisReport> {
        let path = tokio::fs::canonicalize(path).await?;
        let text = read_source(&path).await?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let language = Language::from_path(&path);
        let server = ServerCommand::resolve(&self.config, language);
        debug!(
            "Analyzing {} as {} with {}",
            path.display(),
            server.language_id,
            server.command
        );

        let client = LspClient::spawn(
            &server.command,
            &server.args,
            &root,
            RuntimeConfig::from(&self.config),
        )
        .await?;

        let result = self.run(&client, &path, &server.language_id, text).await;
        if let Err(e) = client.shutdown().await {
            warn!("Language server teardown failed: {}", e);
        }
        result
    }

    /// Drive an already-connected client through the pipeline.
    ///
    /// Any failed step aborts the run; no correlation happens on partial results.
    pub async fn run(
        &self,
        client: &LspClient,
        path: &Path,
        language_id: &str,
        text: String,
    ) -> SymfoldResult<AnalysisReport> {
        let init = client.initialize().await?;
        if !init.capabilities.supports_folding_ranges() {
            debug!("Server does not advertise folding range support");
        }
        if !init.capabilities.supports_document_symbols() {
            debug!("Server does not advertise document symbol support");
        }

        client.open_document(path, language_id, text).await?;
        let folding_ranges = client.folding_ranges().await?;
        let symbols = client.document_symbols().await?;
        let correlated = correlate(&symbols, &folding_ranges, &self.rule);

        debug!(
            "{} symbols, {} folding ranges, {} correlated",
            symbols.len(),
            folding_ranges.len(),
            correlated.len()
        );

        Ok(AnalysisReport {
            symbols,
            folding_ranges,
            correlated,
        })
    }
}

/// Read a source file, replacing invalid UTF-8 with U+FFFD
async fn read_source(path: &Path) -> SymfoldResult<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "{} is not valid UTF-8, invalid bytes replaced",
                path.display()
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LspError, SymfoldError};
    use crate::infra::lsp::SessionState;
    use crate::infra::lsp::testing::FakeServer;
    use crate::models::symbol::SymbolKind;
    use serde_json::json;

    fn file() -> PathBuf {
        PathBuf::from("/work/project/sample.py")
    }

    fn sample_server() -> FakeServer {
        FakeServer::new()
            .with_folding_ranges(json!([
                { "startLine": 2, "endLine": 4 },
                { "startLine": 10, "endLine": 12 }
            ]))
            .with_symbols(json!([
                {
                    "name": "foo",
                    "kind": 12,
                    "location": {
                        "uri": "file:///work/project/sample.py",
                        "range": { "start": { "line": 2, "character": 0 }, "end": { "line": 5, "character": 0 } }
                    }
                },
                {
                    "name": "x",
                    "kind": 13,
                    "location": {
                        "uri": "file:///work/project/sample.py",
                        "range": { "start": { "line": 1, "character": 0 }, "end": { "line": 1, "character": 5 } }
                    }
                }
            ]))
    }

    #[tokio::test]
    async fn test_pipeline_correlates_function_and_skips_variable() {
        let (client, server) = sample_server().start(Path::new("/work/project")).await;
        let service = AnalysisService::new(SymfoldConfig::default());

        let report = service
            .run(&client, &file(), "python", "def foo():\n    pass\n".to_string())
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(report.symbols.len(), 2);
        assert_eq!(report.folding_ranges.len(), 2);
        assert_eq!(report.correlated.len(), 1);
        assert_eq!(report.correlated[0].symbol.name, "foo");
        assert_eq!(report.correlated[0].symbol.kind, SymbolKind::Function);
        assert_eq!(report.correlated[0].region, FoldingRegion::lines(2, 4));

        let log = server.await.unwrap();
        assert_eq!(
            log.methods(),
            vec![
                "initialize",
                "initialized",
                "textDocument/didOpen",
                "textDocument/foldingRange",
                "textDocument/documentSymbol",
                "shutdown",
                "exit"
            ]
        );
        assert_eq!(
            log.params_of("textDocument/didOpen").unwrap()["textDocument"]["languageId"],
            "python"
        );
    }

    #[tokio::test]
    async fn test_configured_offset_reaches_correlation() {
        let (client, _server) = sample_server().start(Path::new("/work/project")).await;
        let mut config = SymfoldConfig::default();
        config.correlation.end_line_offset = 0;
        let service = AnalysisService::new(config);

        let report = service
            .run(&client, &file(), "python", String::new())
            .await
            .unwrap();

        assert!(report.correlated.is_empty());
        assert_eq!(report.symbols.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_request_aborts_pipeline() {
        let (client, server) = sample_server()
            .failing("textDocument/foldingRange", -32603, "internal error")
            .start(Path::new("/work/project"))
            .await;
        let service = AnalysisService::new(SymfoldConfig::default());

        let err = service
            .run(&client, &file(), "python", String::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SymfoldError::Lsp(LspError::Rpc { code: -32603, .. })
        ));
        assert_eq!(client.state(), SessionState::DocumentOpen);

        client.shutdown().await.unwrap();
        let log = server.await.unwrap();
        assert!(!log.methods().contains(&"textDocument/documentSymbol"));
        assert_eq!(client.state(), SessionState::Closed);
    }

    #[test]
    fn test_server_command_defaults_by_language() {
        let config = SymfoldConfig::default();

        let python = ServerCommand::resolve(&config, Language::Python);
        assert_eq!(python.command, "pylsp");
        assert!(python.args.is_empty());
        assert_eq!(python.language_id, "python");

        let ts = ServerCommand::resolve(&config, Language::TypeScript);
        assert_eq!(ts.command, "typescript-language-server");
        assert_eq!(ts.args, vec!["--stdio"]);

        let unknown = ServerCommand::resolve(&config, Language::Unknown);
        assert_eq!(unknown.command, "pylsp");
        assert_eq!(unknown.language_id, "plaintext");
    }

    #[test]
    fn test_server_command_overrides() {
        let mut config = SymfoldConfig::default();
        config.server.command = Some("pyright-langserver".to_string());
        config.server.args = vec!["--stdio".to_string()];
        config.server.language_id = Some("python3".to_string());

        let server = ServerCommand::resolve(&config, Language::Rust);
        assert_eq!(server.command, "pyright-langserver");
        assert_eq!(server.args, vec!["--stdio"]);
        assert_eq!(server.language_id, "python3");
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_spawning() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = SymfoldConfig::default();
        config.server.command = Some("symfold-no-such-server".to_string());
        let service = AnalysisService::new(config);

        let err = service
            .analyze_file(&dir.path().join("missing.py"))
            .await
            .unwrap_err();
        assert!(matches!(err, SymfoldError::Io(_)));
    }

    #[tokio::test]
    async fn test_non_utf8_source_is_decoded_lossily() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("latin1.py");
        tokio::fs::write(&path, [b'x', 0xff, b'\n']).await.unwrap();

        assert_eq!(read_source(&path).await.unwrap(), "x\u{FFFD}\n");
    }

    #[tokio::test]
    async fn test_unknown_server_command_is_server_start_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample.py");
        tokio::fs::write(&path, "x = 1\n").await.unwrap();

        let mut config = SymfoldConfig::default();
        config.server.command = Some("symfold-no-such-server".to_string());
        let service = AnalysisService::new(config);

        let err = service.analyze_file(&path).await.unwrap_err();
        match err {
            SymfoldError::Lsp(LspError::ServerStart(message)) => {
                assert!(message.contains("symfold-no-such-server"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
