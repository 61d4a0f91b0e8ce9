use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use super::protocol::{
    ClientCapabilities, ClientInfo, DidOpenTextDocumentParams, DocumentSymbolResponse,
    InitializeParams, InitializeResult, LogMessageParams, MessageType, ResponseError,
    TextDocumentClientCapabilities, TextDocumentIdentifier, TextDocumentItem, TextDocumentParams,
};
use super::rpc::RpcSession;
use crate::config::RuntimeConfig;
use crate::error::LspError;
use crate::models::lsp::{DocumentIdentity, FoldingRegion, path_to_uri};
use crate::models::symbol::SymbolEntry;

/// Lifecycle of one client session.
///
/// `Uninitialized → Initializing → Ready → DocumentOpen → ShuttingDown → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    DocumentOpen = 3,
    ShuttingDown = 4,
    Closed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::DocumentOpen,
            4 => Self::ShuttingDown,
            5 => Self::Closed,
            _ => Self::Uninitialized,
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Version sent with the single `textDocument/didOpen`
const DOCUMENT_VERSION: i32 = 1;

pub struct LspClient {
    rpc: Arc<RpcSession>,
    process: Mutex<Option<Child>>,
    state: AtomicU8,
    root: PathBuf,
    config: RuntimeConfig,
    document: RwLock<Option<DocumentIdentity>>,
}

impl LspClient {
    /// Start the language server and attach a session to its stdio
    pub async fn spawn(
        command: &str,
        args: &[String],
        root: &Path,
        config: RuntimeConfig,
    ) -> Result<Self, LspError> {
        tracing::info!("Starting language server: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::ServerStart(format!("{}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ServerStart("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ServerStart("Failed to get stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        let client = Self::new(RpcSession::new(stdin), root, config, Some(child));
        client.register_default_handlers().await;
        client.rpc.listen(stdout);
        Ok(client)
    }

    /// Attach a session to an already-connected pair of streams
    pub async fn connect<R, W>(reader: R, writer: W, root: &Path, config: RuntimeConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let client = Self::new(RpcSession::new(writer), root, config, None);
        client.register_default_handlers().await;
        client.rpc.listen(reader);
        client
    }

    fn new(rpc: Arc<RpcSession>, root: &Path, config: RuntimeConfig, child: Option<Child>) -> Self {
        Self {
            rpc,
            process: Mutex::new(child),
            state: AtomicU8::new(SessionState::Uninitialized.to_u8()),
            root: root.to_path_buf(),
            config,
            document: RwLock::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn rpc(&self) -> &Arc<RpcSession> {
        &self.rpc
    }

    fn transition(
        &self,
        from: SessionState,
        to: SessionState,
        operation: &str,
    ) -> Result<(), LspError> {
        self.state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| tracing::debug!("LSP session {:?} -> {:?}", from, to))
            .map_err(|actual| LspError::invalid_state(operation, SessionState::from_u8(actual)))
    }

    /// Run the `initialize` / `initialized` exchange
    pub async fn initialize(&self) -> Result<InitializeResult, LspError> {
        self.transition(
            SessionState::Uninitialized,
            SessionState::Initializing,
            "initialize",
        )?;

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(path_to_uri(&self.root)),
            capabilities: Self::client_capabilities(),
            client_info: Some(ClientInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        };

        let value = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        let result: InitializeResult = if value.is_null() {
            InitializeResult::default()
        } else {
            serde_json::from_value(value)
                .map_err(|e| LspError::Protocol(format!("invalid initialize result: {e}")))?
        };

        if let Some(info) = &result.server_info {
            tracing::debug!(
                "Connected to {} {}",
                info.name,
                info.version.as_deref().unwrap_or("")
            );
        }

        self.rpc
            .notify("initialized", Some(serde_json::json!({})))
            .await?;

        self.transition(SessionState::Initializing, SessionState::Ready, "initialize")?;
        Ok(result)
    }

    /// Capabilities for the two features this client requests
    fn client_capabilities() -> ClientCapabilities {
        ClientCapabilities {
            text_document: Some(TextDocumentClientCapabilities {
                document_symbol: Some(serde_json::json!({
                    "symbolKind": {
                        "valueSet": (1..=26).collect::<Vec<_>>()
                    },
                    "hierarchicalDocumentSymbolSupport": false
                })),
                folding_range: Some(serde_json::json!({
                    "lineFoldingOnly": false
                })),
            }),
        }
    }

    /// Send the full text of the one document this session analyzes
    pub async fn open_document(
        &self,
        path: &Path,
        language_id: &str,
        text: String,
    ) -> Result<DocumentIdentity, LspError> {
        self.transition(
            SessionState::Ready,
            SessionState::DocumentOpen,
            "textDocument/didOpen",
        )?;

        let identity = DocumentIdentity {
            uri: path_to_uri(path),
            version: DOCUMENT_VERSION,
        };
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: identity.uri.clone(),
                language_id: language_id.to_string(),
                version: identity.version,
                text,
            },
        };

        let sent = match serde_json::to_value(params) {
            Ok(params) => self.rpc.notify("textDocument/didOpen", Some(params)).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            self.state
                .store(SessionState::Ready.to_u8(), Ordering::Release);
            return Err(e);
        }

        *self.document.write().await = Some(identity.clone());
        Ok(identity)
    }

    /// `textDocument/foldingRange` for the open document
    pub async fn folding_ranges(&self) -> Result<Vec<FoldingRegion>, LspError> {
        let method = "textDocument/foldingRange";
        let value = self.document_request(method).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value)
            .map_err(|e| LspError::Protocol(format!("invalid {method} result: {e}")))
    }

    /// `textDocument/documentSymbol` for the open document, flattened
    pub async fn document_symbols(&self) -> Result<Vec<SymbolEntry>, LspError> {
        let method = "textDocument/documentSymbol";
        let value = self.document_request(method).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value::<DocumentSymbolResponse>(value)
            .map(DocumentSymbolResponse::into_entries)
            .map_err(|e| LspError::Protocol(format!("invalid {method} result: {e}")))
    }

    /// Issue a `textDocument/*` request, refusing before the document is open
    async fn document_request(&self, method: &str) -> Result<Value, LspError> {
        let state = self.state();
        if state != SessionState::DocumentOpen {
            return Err(LspError::invalid_state(method, state));
        }
        let document = self
            .document
            .read()
            .await
            .clone()
            .ok_or_else(|| LspError::invalid_state(method, state))?;

        let params = TextDocumentParams {
            text_document: TextDocumentIdentifier::new(document.uri),
        };
        self.request(method, Some(serde_json::to_value(params)?))
            .await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, LspError> {
        self.rpc
            .call_with_timeout(method, params, self.config.timeout_for(method))
            .await
    }

    /// Tear the session down: `shutdown` (optional), `exit`, then reap the
    /// server process. Safe to call from any state and more than once.
    pub async fn shutdown(&self) -> Result<(), LspError> {
        let previous = SessionState::from_u8(
            self.state
                .swap(SessionState::ShuttingDown.to_u8(), Ordering::AcqRel),
        );
        if matches!(previous, SessionState::ShuttingDown | SessionState::Closed) {
            self.state.store(previous.to_u8(), Ordering::Release);
            return Ok(());
        }
        tracing::debug!("LSP session {:?} -> ShuttingDown", previous);

        let handshake_done = matches!(previous, SessionState::Ready | SessionState::DocumentOpen);
        if handshake_done && self.config.graceful_shutdown {
            if let Err(e) = self.request("shutdown", None).await {
                tracing::debug!("LSP shutdown request failed: {}", e);
            }
        }

        if previous != SessionState::Uninitialized
            && let Err(e) = self.rpc.notify("exit", None).await
        {
            tracing::debug!("LSP exit notification failed: {}", e);
        }

        // Closing stdin signals EOF to the server
        self.rpc.close().await;

        if let Some(mut child) = self.process.lock().await.take() {
            match timeout(self.config.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!("Language server exited: {:?}", status);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Language server wait error: {}", e);
                }
                Err(_) => {
                    tracing::warn!("Language server termination timed out, forcing kill");
                    let _ = child.kill().await;
                }
            }
        }

        self.state
            .store(SessionState::Closed.to_u8(), Ordering::Release);
        tracing::info!("Language server stopped");
        Ok(())
    }

    async fn register_default_handlers(&self) {
        self.rpc
            .register_handler("workspace/configuration", |params| async move {
                let items = params
                    .as_ref()
                    .and_then(|p| p.get("items"))
                    .and_then(|i| i.as_array())
                    .map(|arr| arr.len())
                    .unwrap_or(0);
                Ok::<_, ResponseError>(Value::Array(vec![Value::Null; items]))
            })
            .await;

        for method in [
            "client/registerCapability",
            "client/unregisterCapability",
            "window/workDoneProgress/create",
        ] {
            self.rpc
                .register_handler(method, |_| async { Ok::<_, ResponseError>(Value::Null) })
                .await;
        }

        for method in ["window/logMessage", "window/showMessage"] {
            self.rpc.on_notification(method, log_server_message).await;
        }
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        if let Ok(mut process_guard) = self.process.try_lock() {
            if let Some(ref mut child) = *process_guard {
                let _ = child.start_kill();
                tracing::debug!("LspClient dropped, process killed");
            }
        } else {
            tracing::warn!("LspClient dropped but could not acquire lock - potential zombie process");
        }
    }
}

/// Map `window/logMessage` onto tracing levels by LSP MessageType
fn log_server_message(params: Value) {
    match serde_json::from_value::<LogMessageParams>(params) {
        Ok(LogMessageParams { typ, message }) => match typ {
            MessageType::Error => tracing::error!("LSP: {}", message),
            MessageType::Warning => tracing::warn!("LSP: {}", message),
            MessageType::Info => tracing::info!("LSP: {}", message),
            MessageType::Log | MessageType::Debug => tracing::debug!("LSP: {}", message),
        },
        Err(e) => tracing::debug!("Unreadable server log message: {}", e),
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!("server stderr: {}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("server stderr closed: {}", e);
                break;
            }
        }
    }
}
