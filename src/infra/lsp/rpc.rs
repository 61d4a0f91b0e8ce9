//! JSON-RPC session over a framed duplex stream
//!
//! One background read loop owns the inbound stream. Callers register a
//! pending entry under the pending-map lock *before* their request is
//! written, so a response can never overtake its own registration.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::protocol::{Message, Notification, Request, RequestId, Response, ResponseError};
use super::transport::{MessageReader, MessageWriter};
use crate::error::LspError;

type PendingCall = oneshot::Sender<Result<Value, LspError>>;
type BoxedWriter = MessageWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Future returned by a registered handler
pub type HandlerFuture = BoxFuture<'static, Result<Value, ResponseError>>;
type Handler = Arc<dyn Fn(Option<Value>) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
struct PendingCalls {
    calls: HashMap<RequestId, PendingCall>,
    closed: bool,
}

pub struct RpcSession {
    writer: Mutex<Option<BoxedWriter>>,
    next_id: AtomicU64,
    pending: Mutex<PendingCalls>,
    handlers: RwLock<HashMap<String, Handler>>,
    stray_responses: AtomicU64,
}

impl RpcSession {
    /// Create a session writing to `writer`. Call [`RpcSession::listen`] to
    /// start reading.
    pub fn new<W>(writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Arc::new(Self {
            writer: Mutex::new(Some(MessageWriter::new(writer))),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(PendingCalls::default()),
            handlers: RwLock::new(HashMap::new()),
            stray_responses: AtomicU64::new(0),
        })
    }

    /// Spawn the read loop over `reader`.
    ///
    /// Pending calls are failed however the loop ends, including a panic.
    pub fn listen<R>(self: &Arc<Self>, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let reader = MessageReader::new(reader);
            let read_loop = tokio::spawn(Arc::clone(&session).read_loop(reader));
            if let Err(e) = read_loop.await {
                tracing::error!("LSP read loop aborted: {}", e);
                session.fail_pending("read loop aborted").await;
            }
        })
    }

    /// Send a request and wait for its response
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, LspError> {
        self.call_with_timeout(method, params, None).await
    }

    /// Send a request and wait at most `limit` for its response.
    ///
    /// On expiry the pending entry is removed; a late response is then
    /// treated as a stray and discarded by the read loop.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Option<Duration>,
    ) -> Result<Value, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request_id = RequestId::Number(id);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(LspError::SessionClosed);
            }
            pending.calls.insert(request_id.clone(), tx);
        }

        tracing::trace!("LSP request {}: {}", id, method);

        if let Err(e) = self.write(&Request::new(id, method, params)).await {
            self.pending.lock().await.calls.remove(&request_id);
            return Err(e);
        }

        let outcome = match limit {
            Some(limit) => match timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending.lock().await.calls.remove(&request_id);
                    return Err(LspError::Timeout(format!(
                        "'{}' timed out after {:?}. The language server may be busy or unresponsive",
                        method, limit
                    )));
                }
            },
            None => rx.await,
        };

        // A dropped sender means the session went away mid-call
        outcome.unwrap_or_else(|_| Err(LspError::SessionClosed))
    }

    /// Send a notification (no response expected)
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), LspError> {
        tracing::trace!("LSP notification: {}", method);
        self.write(&Notification::new(method, params)).await
    }

    /// Install a handler for server-to-client requests and notifications.
    ///
    /// For requests the handler's value becomes the response result; for
    /// notifications it is discarded.
    pub async fn register_handler<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ResponseError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| handler(params).boxed());
        self.handlers
            .write()
            .await
            .insert(method.to_string(), handler);
    }

    /// Register a notification handler for a specific method
    pub async fn on_notification<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.register_handler(method, move |params| {
            handler(params.unwrap_or(Value::Null));
            async { Ok::<_, ResponseError>(Value::Null) }
        })
        .await;
    }

    /// Close the outbound stream and fail every outstanding call
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take()
            && let Err(e) = writer.shutdown().await
        {
            tracing::debug!("Error closing LSP output stream: {}", e);
        }
        self.fail_pending("session closed by client").await;
    }

    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed
    }

    /// Number of outstanding calls
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.calls.len()
    }

    /// Responses received for ids with no outstanding call
    pub fn stray_responses(&self) -> u64 {
        self.stray_responses.load(Ordering::Relaxed)
    }

    /// Whether `id` was allocated by this session at some point
    fn was_issued(&self, id: &RequestId) -> bool {
        let issued = self.next_id.load(Ordering::Relaxed);
        match id {
            RequestId::Number(n) => *n >= 1 && *n < issued,
            RequestId::String(s) => s.parse::<u64>().is_ok_and(|n| n >= 1 && n < issued),
        }
    }

    async fn write<T: Serialize>(&self, message: &T) -> Result<(), LspError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(LspError::SessionClosed)?;
        writer.write_message(message).await
    }

    /// Background task that reads and dispatches inbound frames
    async fn read_loop<R: AsyncRead + Unpin>(self: Arc<Self>, mut reader: MessageReader<R>) {
        let reason = loop {
            match reader.read_frame().await {
                Ok(Some(payload)) => match Message::parse(&payload) {
                    Ok(message) => self.dispatch(message).await,
                    Err(e) => tracing::warn!("Dropping undecodable LSP message: {}", e),
                },
                Ok(None) => break "server closed the connection".to_string(),
                Err(e) => {
                    tracing::error!("LSP read error: {}", e);
                    break e.to_string();
                }
            }
        };

        self.fail_pending(&reason).await;
    }

    /// Mark the session closed and resolve all pending calls with `SessionClosed`
    async fn fail_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        pending.closed = true;
        let count = pending.calls.len();
        if count > 0 {
            tracing::debug!("Failing {} pending requests: {}", count, reason);
            for (_, sender) in pending.calls.drain() {
                let _ = sender.send(Err(LspError::SessionClosed));
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, message: Message) {
        match message {
            Message::Response(response) => self.resolve(response).await,
            Message::Request(request) => {
                let handler = self.handlers.read().await.get(&request.method).cloned();
                let session = Arc::clone(self);
                // Answer off the read loop so a slow handler or a busy writer
                // never stalls inbound traffic
                tokio::spawn(async move {
                    let response = match handler {
                        Some(handler) => match handler(request.params).await {
                            Ok(result) => Response::ok(request.id, result),
                            Err(error) => Response::err(request.id, error),
                        },
                        None => {
                            tracing::debug!("Unhandled server request: {}", request.method);
                            Response::err(
                                request.id,
                                ResponseError::method_not_found(&request.method),
                            )
                        }
                    };
                    if let Err(e) = session.write(&response).await {
                        tracing::debug!("Failed to answer server request: {}", e);
                    }
                });
            }
            Message::Notification(notification) => {
                let handler = self
                    .handlers
                    .read()
                    .await
                    .get(&notification.method)
                    .cloned();
                match handler {
                    Some(handler) => {
                        if let Err(e) = handler(notification.params).await {
                            tracing::debug!(
                                "Notification handler for {} failed: {}",
                                notification.method,
                                e
                            );
                        }
                    }
                    None => tracing::trace!("Unhandled notification: {}", notification.method),
                }
            }
        }
    }

    async fn resolve(&self, response: Response) {
        let Some(id) = response.id.clone() else {
            tracing::warn!(
                "Received response without id: {:?}",
                response.error.as_ref().map(|e| e.to_string())
            );
            return;
        };

        let sender = {
            let mut pending = self.pending.lock().await;
            // Try direct match first, then string->number coercion for compatibility
            pending.calls.remove(&id).or_else(|| match &id {
                RequestId::String(s) => s
                    .parse::<u64>()
                    .ok()
                    .and_then(|n| pending.calls.remove(&RequestId::Number(n))),
                RequestId::Number(_) => None,
            })
        };

        match sender {
            Some(tx) => {
                let _ = tx.send(response.into_result());
            }
            None => {
                self.stray_responses.fetch_add(1, Ordering::Relaxed);
                if self.was_issued(&id) {
                    tracing::debug!("Discarding late response for request {}", id);
                } else {
                    tracing::warn!(
                        "{} (dropped)",
                        LspError::Protocol(format!("response for unknown request id {id}"))
                    );
                }
            }
        }
    }
}
