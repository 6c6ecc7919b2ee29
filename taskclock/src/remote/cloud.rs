//! WebSocket client for the `taskclock-cloud` record service.
//!
//! Implements [`RemoteSync`] over one WebSocket connection. Requests carry a
//! client-chosen id and may be in flight concurrently; a background reader
//! task routes each response to the caller waiting on that id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskclock_proto::cloud::{self, CloudFrame, CloudRequest, CloudResponse, Predicate};
use taskclock_proto::record::{Record, RecordId, RecordType};

use super::{RemoteError, RemoteKind, RemoteSync};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Requests awaiting a response, keyed by request id.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<CloudResponse>>>>;

/// Connection settings for [`CloudRemote::connect`].
#[derive(Debug, Clone)]
pub struct CloudSettings {
    /// Service URL (`ws://` or `wss://`, path `/ws`).
    pub url: String,
    /// User whose private zone to open.
    pub user_id: String,
    /// Bound on establishing the WebSocket.
    pub connect_timeout: Duration,
    /// Bound on waiting for the `Registered` acknowledgment.
    pub register_timeout: Duration,
}

/// [`RemoteSync`] backend talking to the cloud record service.
///
/// Created via [`CloudRemote::connect`], which opens the WebSocket,
/// registers the user zone, and spawns the background reader task.
pub struct CloudRemote {
    /// User whose zone this connection operates on.
    user_id: String,
    /// Service URL this client is connected to.
    url: String,
    /// Write half of the WebSocket connection (shared for concurrent requests).
    ws_sender: AsyncMutex<WsSender>,
    /// Senders waiting for a response.
    pending: PendingMap,
    /// Next request id.
    next_request_id: AtomicU64,
    /// Whether the connection is still up.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task.
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CloudRemote {
    /// Connect to the record service and register the user zone.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::Timeout`] if connecting or registering times out.
    /// - [`RemoteError::ConnectionClosed`] if the service is unreachable or
    ///   hangs up during registration.
    /// - [`RemoteError::Rejected`] if the service refuses the registration.
    /// - [`RemoteError::Protocol`] for unexpected or malformed frames.
    pub async fn connect(settings: &CloudSettings) -> Result<Self, RemoteError> {
        let url = settings.url.as_str();
        let (ws_stream, _response) =
            tokio::time::timeout(settings.connect_timeout, connect_async(url))
                .await
                .map_err(|_| {
                    tracing::warn!(url, "cloud WebSocket connect timed out");
                    RemoteError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url, err = %e, "cloud WebSocket connect failed");
                    RemoteError::ConnectionClosed
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let register = CloudFrame::Register {
            user_id: settings.user_id.clone(),
        };
        let bytes = cloud::encode(&register).map_err(|e| RemoteError::Protocol(e.to_string()))?;
        ws_sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send Register frame");
                RemoteError::ConnectionClosed
            })?;

        let ack = tokio::time::timeout(settings.register_timeout, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url, "cloud registration acknowledgment timed out");
                RemoteError::Timeout
            })?;

        match ack {
            Some(Ok(Message::Binary(data))) => match cloud::decode(&data) {
                Ok(CloudFrame::Registered { user_id }) => {
                    tracing::info!(user_id = %user_id, url, "registered with cloud record service");
                }
                Ok(CloudFrame::Error { reason }) => {
                    tracing::warn!(reason = %reason, "cloud registration rejected");
                    return Err(RemoteError::Rejected(reason));
                }
                Ok(other) => {
                    tracing::warn!(?other, "unexpected frame during registration");
                    return Err(RemoteError::Protocol(
                        "unexpected frame during registration".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(RemoteError::Protocol(format!(
                        "malformed registration response: {e}"
                    )));
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                tracing::warn!("cloud service closed connection during registration");
                return Err(RemoteError::ConnectionClosed);
            }
            Some(Ok(_)) => {
                return Err(RemoteError::Protocol(
                    "unexpected non-binary frame during registration".to_string(),
                ));
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "WebSocket error during registration");
                return Err(RemoteError::ConnectionClosed);
            }
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&pending),
            Arc::clone(&connected),
        ));

        Ok(Self {
            user_id: settings.user_id.clone(),
            url: settings.url.clone(),
            ws_sender: AsyncMutex::new(ws_sender),
            pending,
            next_request_id: AtomicU64::new(1),
            connected,
            reader_handle,
        })
    }

    /// Return the user id this connection is registered as.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Return the service URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the connection to the service is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Send one request and wait for its response.
    async fn call(&self, request: CloudRequest) -> Result<CloudResponse, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::ConnectionClosed);
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        // Removes the entry again if this future is dropped (e.g. on timeout).
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id,
        };

        let frame = CloudFrame::Request {
            request_id,
            request,
        };
        let bytes = cloud::encode(&frame).map_err(|e| RemoteError::Protocol(e.to_string()))?;

        {
            let mut sender = self.ws_sender.lock().await;
            sender
                .send(Message::Binary(bytes.into()))
                .await
                .map_err(|e| {
                    tracing::warn!(err = %e, request_id, "cloud send failed");
                    self.connected.store(false, Ordering::Relaxed);
                    RemoteError::ConnectionClosed
                })?;
        }

        tracing::debug!(request_id, "cloud request sent");
        rx.await.map_err(|_| RemoteError::ConnectionClosed)
    }
}

impl Drop for CloudRemote {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Drops a pending entry when the waiting call goes away.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    request_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request_id);
    }
}

fn unexpected(op: &str, response: &CloudResponse) -> RemoteError {
    RemoteError::Protocol(format!("unexpected response to {op}: {response:?}"))
}

impl RemoteSync for CloudRemote {
    async fn fetch(&self, id: &RecordId) -> Result<Record, RemoteError> {
        match self.call(CloudRequest::Fetch { id: id.clone() }).await? {
            CloudResponse::Record(record) => Ok(record),
            CloudResponse::NotFound { id } => Err(RemoteError::NotFound(id)),
            CloudResponse::Error { reason } => Err(RemoteError::Rejected(reason)),
            other => Err(unexpected("fetch", &other)),
        }
    }

    async fn save(&self, record: Record) -> Result<Record, RemoteError> {
        match self.call(CloudRequest::Save { record }).await? {
            CloudResponse::Record(record) => Ok(record),
            CloudResponse::Error { reason } => Err(RemoteError::Rejected(reason)),
            other => Err(unexpected("save", &other)),
        }
    }

    async fn delete(&self, id: &RecordId) -> Result<(), RemoteError> {
        match self.call(CloudRequest::Delete { id: id.clone() }).await? {
            CloudResponse::Deleted { .. } => Ok(()),
            CloudResponse::NotFound { id } => Err(RemoteError::NotFound(id)),
            CloudResponse::Error { reason } => Err(RemoteError::Rejected(reason)),
            other => Err(unexpected("delete", &other)),
        }
    }

    async fn query(
        &self,
        record_type: RecordType,
        predicate: Predicate,
    ) -> Result<Vec<Record>, RemoteError> {
        match self
            .call(CloudRequest::Query {
                record_type,
                predicate,
            })
            .await?
        {
            CloudResponse::Records(records) => Ok(records),
            CloudResponse::Error { reason } => Err(RemoteError::Rejected(reason)),
            other => Err(unexpected("query", &other)),
        }
    }

    fn kind(&self) -> RemoteKind {
        RemoteKind::Cloud
    }
}

/// Background task that reads response frames and wakes their callers.
///
/// Malformed frames and responses for unknown ids are logged and skipped.
/// When the socket closes, every waiting caller is released with
/// [`RemoteError::ConnectionClosed`].
async fn reader_loop(mut ws_reader: WsReader, pending: PendingMap, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match cloud::decode(&data) {
                Ok(CloudFrame::Response {
                    request_id,
                    response,
                }) => {
                    let waiter = pending.lock().remove(&request_id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => {
                            tracing::debug!(request_id, "response for abandoned request");
                        }
                    }
                }
                Ok(CloudFrame::Error { reason }) => {
                    tracing::warn!(reason = %reason, "cloud service error");
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected cloud frame");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed cloud frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("cloud WebSocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "cloud WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    pending.lock().clear();
    tracing::info!("cloud reader task exiting");
}
