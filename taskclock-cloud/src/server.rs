//! Record service core: shared state, WebSocket handler, and request
//! dispatch.
//!
//! Each connection registers a user id first and from then on operates only
//! on that user's zone of the [`RecordStore`]. Requests are answered in the
//! order they arrive on a connection, each response echoing the request id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskclock_proto::cloud::{self, CloudFrame, CloudRequest, CloudResponse};
use tokio::sync::{RwLock, mpsc};

use crate::store::RecordStore;

/// Default maximum accepted frame size in bytes (64 KB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Shared service state: the record zones and the open sessions.
pub struct CloudState {
    /// Per-user record zones.
    pub store: RecordStore,
    /// Open sessions by session id, with the user each one registered as.
    sessions: RwLock<HashMap<u64, (String, mpsc::UnboundedSender<Message>)>>,
    /// Next session id.
    next_session: AtomicU64,
    /// Largest binary frame the service will decode.
    max_frame_size: usize,
}

impl Default for CloudState {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudState {
    /// Creates state with an empty store and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_FRAME_SIZE, RecordStore::new())
    }

    /// Creates state with a custom frame size limit and record store.
    #[must_use]
    pub fn with_config(max_frame_size: usize, store: RecordStore) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            max_frame_size,
        }
    }

    /// Adds a session, returning its id.
    async fn open_session(&self, user_id: &str, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .write()
            .await
            .insert(session_id, (user_id.to_string(), sender));
        session_id
    }

    async fn close_session(&self, session_id: u64) {
        self.sessions.write().await.remove(&session_id);
    }

    /// Number of open sessions registered as `user_id`.
    pub async fn session_count(&self, user_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|(user, _)| user == user_id)
            .count()
    }

    /// Send a WebSocket Close frame on every open session.
    pub async fn close_all_connections(&self) {
        let sessions = self.sessions.read().await;
        for (session_id, (user_id, sender)) in sessions.iter() {
            tracing::info!(session_id, user_id = %user_id, "closing session");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Wait for a `Register` frame.
/// 2. Open a session and send `Registered` back.
/// 3. Answer requests against the user's zone until the socket closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<CloudState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(user_id) = wait_for_register(&mut ws_receiver).await else {
        tracing::warn!("connection closed before registration");
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let session_id = state.open_session(&user_id, tx.clone()).await;

    let ack = CloudFrame::Registered {
        user_id: user_id.clone(),
    };
    if let Err(e) = send_frame(&mut ws_sender, &ack).await {
        tracing::error!(user_id = %user_id, error = %e, "failed to send Registered ack");
        state.close_session(session_id).await;
        return;
    }
    tracing::info!(session_id, user_id = %user_id, "session registered");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(session_id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let reader_user = user_id.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    if let Some(reply) = handle_binary_frame(&reader_user, &data, &reader_state).await
                        && let Ok(bytes) = cloud::encode(&reply)
                        && tx.send(Message::Binary(bytes.into())).is_err()
                    {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::info!(session_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.close_session(session_id).await;
    tracing::info!(session_id, user_id = %user_id, "session closed");
}

/// Waits for the first frame, expecting `Register`.
///
/// Returns the user id, or `None` if the connection closes or anything else
/// arrives first.
async fn wait_for_register(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match cloud::decode(&data) {
                Ok(CloudFrame::Register { user_id }) => {
                    if user_id.is_empty() {
                        tracing::warn!("received Register with empty user_id");
                        return None;
                    }
                    return Some(user_id);
                }
                Ok(other) => {
                    tracing::warn!(frame = ?other, "expected Register, got different frame");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode registration frame");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Decodes one frame from a registered session and returns the reply, if any.
async fn handle_binary_frame(user_id: &str, data: &[u8], state: &CloudState) -> Option<CloudFrame> {
    if data.len() > state.max_frame_size {
        tracing::warn!(
            user_id = %user_id,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        return Some(CloudFrame::Error {
            reason: format!(
                "frame too large: {} bytes (max {})",
                data.len(),
                state.max_frame_size
            ),
        });
    }

    let frame = match cloud::decode(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "malformed frame, skipping");
            return None;
        }
    };

    match frame {
        CloudFrame::Request {
            request_id,
            request,
        } => {
            let response = handle_request(state, user_id, request).await;
            Some(CloudFrame::Response {
                request_id,
                response,
            })
        }
        CloudFrame::Register { user_id: new_id } => {
            tracing::warn!(
                user_id = %user_id,
                new_id = %new_id,
                "received duplicate Register on registered session"
            );
            None
        }
        other => {
            tracing::warn!(user_id = %user_id, frame = ?other, "unexpected frame from client");
            None
        }
    }
}

/// Applies one request to `user_id`'s zone.
pub async fn handle_request(state: &CloudState, user_id: &str, request: CloudRequest) -> CloudResponse {
    match request {
        CloudRequest::Fetch { id } => {
            tracing::debug!(user_id = %user_id, record_id = %id, "fetch");
            match state.store.fetch(user_id, &id).await {
                Some(record) => CloudResponse::Record(record),
                None => CloudResponse::NotFound { id },
            }
        }
        CloudRequest::Save { record } => {
            tracing::debug!(user_id = %user_id, record_id = %record.id, "save");
            match state.store.save(user_id, record).await {
                Ok(saved) => CloudResponse::Record(saved),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "save rejected");
                    CloudResponse::Error {
                        reason: e.to_string(),
                    }
                }
            }
        }
        CloudRequest::Delete { id } => {
            tracing::debug!(user_id = %user_id, record_id = %id, "delete");
            if state.store.delete(user_id, &id).await {
                CloudResponse::Deleted { id }
            } else {
                CloudResponse::NotFound { id }
            }
        }
        CloudRequest::Query {
            record_type,
            predicate,
        } => {
            let records = state.store.query(user_id, record_type, &predicate).await;
            tracing::debug!(user_id = %user_id, ?record_type, count = records.len(), "query");
            CloudResponse::Records(records)
        }
    }
}

/// Encodes and sends a frame directly on a WebSocket sender.
async fn send_frame(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &CloudFrame,
) -> Result<(), String> {
    let bytes = cloud::encode(frame).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the service on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(CloudState::new())).await
}

/// Starts the service with a pre-configured [`CloudState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<CloudState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "record service error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<CloudState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
