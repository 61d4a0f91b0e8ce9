//! In-process language server double for session and pipeline tests

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

use super::client::LspClient;
use super::protocol::{Message, Response, ResponseError};
use super::transport::{MessageReader, MessageWriter};
use crate::config::RuntimeConfig;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Every request and notification the fake server received, in order
#[derive(Debug, Default)]
pub(crate) struct ServerLog {
    entries: Vec<(String, Option<Value>)>,
}

impl ServerLog {
    pub(crate) fn methods(&self) -> Vec<&str> {
        self.entries.iter().map(|(m, _)| m.as_str()).collect()
    }

    pub(crate) fn params_of(&self, method: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|(m, _)| m == method)
            .and_then(|(_, p)| p.clone())
    }
}

/// Scripted server: answers the handshake and the two feature requests
pub(crate) struct FakeServer {
    folding_ranges: Value,
    symbols: Value,
    failures: HashMap<String, (i32, String)>,
    unanswered: HashSet<String>,
}

impl FakeServer {
    pub(crate) fn new() -> Self {
        Self {
            folding_ranges: Value::Array(Vec::new()),
            symbols: Value::Array(Vec::new()),
            failures: HashMap::new(),
            unanswered: HashSet::new(),
        }
    }

    pub(crate) fn with_folding_ranges(mut self, ranges: Value) -> Self {
        self.folding_ranges = ranges;
        self
    }

    pub(crate) fn with_symbols(mut self, symbols: Value) -> Self {
        self.symbols = symbols;
        self
    }

    pub(crate) fn failing(mut self, method: &str, code: i32, message: &str) -> Self {
        self.failures
            .insert(method.to_string(), (code, message.to_string()));
        self
    }

    /// Log requests for `method` but never reply to them
    pub(crate) fn ignoring(mut self, method: &str) -> Self {
        self.unanswered.insert(method.to_string());
        self
    }

    pub(crate) async fn start(self, root: &Path) -> (LspClient, JoinHandle<ServerLog>) {
        self.start_with_config(root, RuntimeConfig::default()).await
    }

    pub(crate) async fn start_with_config(
        self,
        root: &Path,
        config: RuntimeConfig,
    ) -> (LspClient, JoinHandle<ServerLog>) {
        let (client_out, server_in) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_out, client_in) = tokio::io::duplex(PIPE_CAPACITY);
        let client = LspClient::connect(client_in, client_out, root, config).await;
        let handle = tokio::spawn(self.serve(
            MessageReader::new(server_in),
            MessageWriter::new(server_out),
        ));
        (client, handle)
    }

    async fn serve(
        self,
        mut reader: MessageReader<DuplexStream>,
        mut writer: MessageWriter<DuplexStream>,
    ) -> ServerLog {
        let mut log = ServerLog::default();

        while let Ok(Some(message)) = reader.read_message().await {
            match message {
                Message::Request(request) => {
                    log.entries
                        .push((request.method.clone(), request.params.clone()));
                    if self.unanswered.contains(&request.method) {
                        continue;
                    }
                    let response = self.answer(&request.method, request.id);
                    if writer.write_message(&response).await.is_err() {
                        break;
                    }
                }
                Message::Notification(notification) => {
                    let exit = notification.method == "exit";
                    log.entries.push((notification.method, notification.params));
                    if exit {
                        break;
                    }
                }
                Message::Response(_) => {}
            }
        }

        log
    }

    fn answer(&self, method: &str, id: super::protocol::RequestId) -> Response {
        if let Some((code, message)) = self.failures.get(method) {
            return Response::err(
                id,
                ResponseError {
                    code: *code,
                    message: message.clone(),
                    data: None,
                },
            );
        }

        match method {
            "initialize" => Response::ok(
                id,
                serde_json::json!({
                    "capabilities": {
                        "documentSymbolProvider": true,
                        "foldingRangeProvider": true
                    },
                    "serverInfo": { "name": "fake-server", "version": "0.0.1" }
                }),
            ),
            "textDocument/foldingRange" => Response::ok(id, self.folding_ranges.clone()),
            "textDocument/documentSymbol" => Response::ok(id, self.symbols.clone()),
            "shutdown" => Response::ok(id, Value::Null),
            other => Response::err(id, ResponseError::method_not_found(other)),
        }
    }
}

/// Client wired to raw server-side streams, for tests that script frames by hand
pub(crate) async fn connect_pair(
    root: &Path,
) -> (
    LspClient,
    MessageReader<DuplexStream>,
    MessageWriter<DuplexStream>,
) {
    let (client_out, server_in) = tokio::io::duplex(PIPE_CAPACITY);
    let (server_out, client_in) = tokio::io::duplex(PIPE_CAPACITY);
    let client = LspClient::connect(client_in, client_out, root, RuntimeConfig::default()).await;
    (
        client,
        MessageReader::new(server_in),
        MessageWriter::new(server_out),
    )
}
