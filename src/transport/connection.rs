//! WebSocket connection and receive loop.
//!
//! This module handles the WebSocket connection to the browser's debugging
//! endpoint, including call correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the browser (responses, events)
//! - Outgoing frames from callers
//! - Teardown: failing pending calls and closing subscriptions
//!
//! Callers register their pending call in the shared table *before* the
//! frame is queued, so a response can never overtake its registration.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId};
use crate::protocol::{Command, DecodeError, Incoming, Request};

use super::bus::{DEFAULT_QUEUE_CAPACITY, EventBus, EventFilter, Subscription};
use super::dispatcher::PendingCalls;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a single call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending calls before rejecting new ones.
pub const MAX_PENDING_CALLS: usize = 256;

/// How much of an undecodable frame to include in the log line.
const FRAME_LOG_LIMIT: usize = 256;

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Tunables for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout used by [`Connection::send`] when none is given.
    pub call_timeout: Duration,
    /// Ceiling on calls in flight.
    pub max_pending_calls: usize,
    /// Per-subscriber event queue capacity.
    pub event_queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_pending_calls: MAX_PENDING_CALLS,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write an encoded request. The call is already registered.
    Write { id: CallId, frame: String },
    /// Close the socket and stop the loop.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to a browser debugging endpoint.
///
/// Cheap to clone; all clones share one socket and one receive loop. The
/// loop stops when [`Connection::close`] is called or when the last clone is
/// dropped.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    /// Endpoint URL, for logging.
    endpoint: String,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Pending-call table (shared with event loop).
    pending: Arc<PendingCalls>,
    /// Event fan-out (shared with event loop).
    bus: Arc<EventBus>,
    /// Set by the event loop when it exits.
    terminated: Arc<AtomicBool>,
    /// Receive loop, taken by the first `close()`.
    loop_task: Mutex<Option<JoinHandle<()>>>,
    config: ConnectionConfig,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint)
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Connects to a debugging endpoint (`ws://host:port/devtools/browser/...`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the endpoint refuses the connection
    /// or the WebSocket handshake fails.
    pub async fn open(endpoint: &str, config: ConnectionConfig) -> Result<Self> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| Error::connection(format!("{endpoint}: {e}")))?;

        debug!(endpoint, "WebSocket connection established");
        Ok(Self::from_stream(ws_stream, endpoint, config))
    }

    /// Wraps an established WebSocket stream and spawns the receive loop.
    pub(crate) fn from_stream<S>(
        ws_stream: WebSocketStream<S>,
        endpoint: &str,
        config: ConnectionConfig,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingCalls::new(config.max_pending_calls));
        let bus = EventBus::new(config.event_queue_capacity);
        let terminated = Arc::new(AtomicBool::new(false));

        let loop_task = tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&pending),
            Arc::clone(&bus),
            Arc::clone(&terminated),
        ));

        Self {
            inner: Arc::new(ConnectionInner {
                endpoint: endpoint.to_string(),
                command_tx,
                pending,
                bus,
                terminated,
                loop_task: Mutex::new(Some(loop_task)),
                config,
            }),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Sends a typed command and waits for its result.
    ///
    /// `session` routes the command to a flattened page session; `None`
    /// addresses the browser. `call_timeout` defaults to the configured one.
    ///
    /// # Errors
    ///
    /// See [`Connection::call_raw`].
    pub async fn send(
        &self,
        command: Command,
        session: Option<&SessionId>,
        call_timeout: Option<Duration>,
    ) -> Result<Value> {
        let (method, params) = command.to_parts()?;
        self.call_raw(&method, params, session, call_timeout).await
    }

    /// Sends a raw `method` + `params` call and waits for its result.
    ///
    /// If the returned future is dropped before completion the call is
    /// removed from the pending table and any late response is discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the browser rejects the call
    /// - [`Error::CallTimeout`] if no response arrives in time
    /// - [`Error::ConnectionClosed`] if the connection closes first
    /// - [`Error::TooManyPendingCalls`] if the in-flight ceiling is reached
    pub async fn call_raw(
        &self,
        method: &str,
        params: Value,
        session: Option<&SessionId>,
        call_timeout: Option<Duration>,
    ) -> Result<Value> {
        let call_timeout = call_timeout.unwrap_or(self.inner.config.call_timeout);
        let id = self.inner.pending.next_id();
        let request = Request::new(id, method, params, session.cloned());
        let frame = request.encode()?;

        let (slot, outcome) = oneshot::channel();
        self.inner.pending.register(id, method, slot)?;
        let guard = PendingGuard {
            pending: &self.inner.pending,
            id,
        };

        self.inner
            .command_tx
            .send(ConnectionCommand::Write { id, frame })
            .map_err(|_| Error::ConnectionClosed)?;

        trace!(%id, method, session = ?session.map(SessionId::as_str), "Call sent");

        match timeout(call_timeout, outcome).await {
            Ok(Ok(result)) => {
                guard.disarm();
                result
            }
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                drop(guard);
                debug!(%id, method, timeout_ms = call_timeout.as_millis() as u64, "Call timed out");
                Err(Error::call_timeout(
                    id,
                    method,
                    call_timeout.as_millis() as u64,
                ))
            }
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribes to events matching `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.inner.bus.subscribe(filter)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Returns the endpoint this connection was opened against.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns `true` once the receive loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    /// Returns the connection configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> ConnectionConfig {
        self.inner.config
    }

    /// Closes the socket and waits for the receive loop to finish.
    ///
    /// Idempotent. Pending calls are rejected with
    /// [`Error::ConnectionClosed`].
    pub async fn close(&self) {
        let task = self.inner.loop_task.lock().take();
        let Some(task) = task else {
            return;
        };

        let _ = self.inner.command_tx.send(ConnectionCommand::Shutdown);
        if let Err(e) = task.await {
            warn!(error = %e, "Receive loop task failed");
        }
        debug!(endpoint = %self.inner.endpoint, "Connection closed");
    }

    // ========================================================================
    // Event Loop
    // ========================================================================

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        pending: Arc<PendingCalls>,
        bus: Arc<EventBus>,
        terminated: Arc<AtomicBool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut failure: Option<String> = None;

        loop {
            tokio::select! {
                // Incoming frames from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &pending, &bus);
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            failure = Some(e.to_string());
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Frames and control from callers
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Write { id, frame }) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                error!(%id, error = %e, "Failed to write frame");
                                let message = e.to_string();
                                pending.reject(id, |_| Error::connection(message.clone()));
                                failure = Some(message);
                                break;
                            }
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        // Fail all pending calls and subscriptions on exit
        match failure {
            Some(message) => pending.fail_all(|| Error::connection(message.clone())),
            None => pending.fail_all(|| Error::ConnectionClosed),
        };
        bus.close();
        terminated.store(true, Ordering::Release);

        debug!("Event loop terminated");
    }

    /// Routes one inbound text frame.
    fn handle_incoming_message(text: &str, pending: &PendingCalls, bus: &EventBus) {
        match Incoming::decode(text) {
            Ok(Incoming::Response(response)) => {
                pending.resolve(response);
            }

            Ok(Incoming::Event(event)) => {
                trace!(method = %event.method, session = ?event.session_id, "Event received");
                bus.publish(&event);
            }

            Err(DecodeError::MalformedResponse { id, source }) => {
                warn!(%id, error = %source, "Malformed response");
                pending.reject(id, |method| {
                    Error::unexpected_response(method, source.to_string())
                });
            }

            Err(e) => {
                warn!(error = %e, frame = %truncate(text, FRAME_LOG_LIMIT), "Dropping undecodable frame");
            }
        }
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a call from the pending table unless disarmed.
struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: CallId,
}

impl PendingGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

/// Cuts `text` to at most `limit` bytes on a char boundary.
fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// Tests
// ============================================================================
