//! Scripted stand-in for a browser debugging endpoint, used by tests.
//!
//! Binds a WebSocket server to `127.0.0.1:0`, accepts one client, records
//! every request it receives and answers through a responder closure.
//! Tests can also push raw frames or close the socket at any time.
//!
//! [`ScriptedPage`] is a ready-made responder that behaves like a browser
//! hosting one page: it creates and attaches targets, emits lifecycle events
//! on navigation, and serves print and screenshot payloads.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

// ============================================================================
// Types
// ============================================================================

/// Produces the frames sent back for one request.
pub(crate) type Responder = Box<dyn FnMut(&Value) -> Vec<Value> + Send>;

/// Out-of-band instructions for the server task.
enum MockAction {
    Send(String),
    Close,
}

// ============================================================================
// MockBrowser
// ============================================================================

/// A fake debugging endpoint.
pub(crate) struct MockBrowser {
    port: u16,
    control: mpsc::UnboundedSender<MockAction>,
    requests: Arc<Mutex<Vec<Value>>>,
    responder: Arc<Mutex<Responder>>,
}

impl MockBrowser {
    /// Binds a random port and starts serving with `responder`.
    pub(crate) async fn start<F>(responder: F) -> Self
    where
        F: FnMut(&Value) -> Vec<Value> + Send + 'static,
    {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await.expect("bind mock browser");
        let port = listener.local_addr().expect("local addr").port();

        let (control, control_rx) = mpsc::unbounded_channel();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Mutex<Responder>> = Arc::new(Mutex::new(Box::new(responder)));

        tokio::spawn(Self::serve(
            listener,
            control_rx,
            Arc::clone(&requests),
            Arc::clone(&responder),
        ));

        debug!(port, "Mock browser bound");
        Self {
            port,
            control,
            requests,
            responder,
        }
    }

    /// WebSocket URL clients connect to.
    pub(crate) fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/devtools/browser/mock", self.port)
    }

    /// Replaces the responder for subsequent requests.
    pub(crate) fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Value) -> Vec<Value> + Send + 'static,
    {
        *self.responder.lock() = Box::new(responder);
    }

    /// Sends a JSON frame to the client.
    pub(crate) fn push(&self, frame: Value) {
        self.push_raw(frame.to_string());
    }

    /// Sends a raw text frame to the client.
    pub(crate) fn push_raw(&self, text: impl Into<String>) {
        let _ = self.control.send(MockAction::Send(text.into()));
    }

    /// Closes the WebSocket from the server side.
    pub(crate) fn close(&self) {
        let _ = self.control.send(MockAction::Close);
    }

    /// Every request received so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    /// Methods of every request received so far.
    pub(crate) fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| r["method"].as_str().map(str::to_string))
            .collect()
    }

    async fn serve(
        listener: TcpListener,
        mut control_rx: mpsc::UnboundedReceiver<MockAction>,
        requests: Arc<Mutex<Vec<Value>>>,
        responder: Arc<Mutex<Responder>>,
    ) {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    let Some(Ok(Message::Text(text))) = message else {
                        break;
                    };
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    requests.lock().push(request.clone());
                    let frames = {
                        let mut respond = responder.lock();
                        (*respond)(&request)
                    };
                    for frame in frames {
                        if ws_write.send(Message::Text(frame.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }

                action = control_rx.recv() => {
                    match action {
                        Some(MockAction::Send(text)) => {
                            if ws_write.send(Message::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                        Some(MockAction::Close) | None => {
                            let _ = ws_write.close().await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Frame Helpers
// ============================================================================

/// Success response to `request`.
pub(crate) fn reply(request: &Value, result: Value) -> Value {
    let mut frame = json!({ "id": request["id"], "result": result });
    if let Some(session) = request.get("sessionId") {
        frame["sessionId"] = session.clone();
    }
    frame
}

/// Error response to `request`.
pub(crate) fn reply_error(request: &Value, code: i64, message: &str) -> Value {
    json!({ "id": request["id"], "error": { "code": code, "message": message } })
}

/// Event frame, optionally tagged with a session.
pub(crate) fn event(method: &str, params: Value, session: Option<&str>) -> Value {
    let mut frame = json!({ "method": method, "params": params });
    if let Some(session) = session {
        frame["sessionId"] = json!(session);
    }
    frame
}

// ============================================================================
// ScriptedPage
// ============================================================================

/// Behaviour of a one-page browser.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedPage {
    /// Emit a `networkIdle` lifecycle event after `load`.
    pub idle_event: bool,
    /// Start a subresource request on navigation that never finishes.
    pub hanging_request: bool,
    /// `errorText` returned by `Page.navigate`.
    pub navigation_error: Option<String>,
    /// Error returned by `Page.printToPDF`.
    pub print_error: Option<(i64, String)>,
    /// PDF bytes, split into `IO.read` chunks when streamed.
    pub pdf_chunks: Vec<Vec<u8>>,
    /// Screenshot bytes.
    pub image: Vec<u8>,
    /// Value reported for `window.status`.
    pub window_status: String,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self {
            idle_event: false,
            hanging_request: false,
            navigation_error: None,
            print_error: None,
            pdf_chunks: vec![b"%PDF-1.7\n".to_vec(), b"%%EOF\n".to_vec()],
            image: b"\x89PNG\r\n\x1a\nfake".to_vec(),
            window_status: String::new(),
        }
    }
}

impl ScriptedPage {
    /// Concatenated PDF payload.
    pub(crate) fn pdf(&self) -> Vec<u8> {
        self.pdf_chunks.concat()
    }

    /// Turns the script into a responder.
    pub(crate) fn into_responder(self) -> impl FnMut(&Value) -> Vec<Value> + Send + 'static {
        let mut navigations = 0u32;
        let mut reads = 0usize;

        move |request: &Value| {
            let method = request["method"].as_str().unwrap_or_default();
            let session = request["sessionId"].as_str();

            match method {
                "Target.createTarget" => vec![reply(request, json!({ "targetId": "T1" }))],
                "Target.attachToTarget" => vec![reply(request, json!({ "sessionId": "S1" }))],
                "Target.closeTarget" => vec![reply(request, json!({ "success": true }))],

                "Page.navigate" => {
                    navigations += 1;
                    let loader = format!("L{navigations}");

                    if let Some(error) = &self.navigation_error {
                        return vec![reply(
                            request,
                            json!({ "frameId": "F1", "loaderId": loader, "errorText": error }),
                        )];
                    }

                    let mut frames = vec![reply(
                        request,
                        json!({ "frameId": "F1", "loaderId": loader }),
                    )];
                    let lifecycle = |name: &str| {
                        event(
                            "Page.lifecycleEvent",
                            json!({ "frameId": "F1", "loaderId": loader, "name": name }),
                            session,
                        )
                    };
                    frames.push(lifecycle("init"));
                    if self.hanging_request {
                        frames.push(event(
                            "Network.requestWillBeSent",
                            json!({
                                "requestId": "R-hang",
                                "loaderId": loader,
                                "type": "XHR",
                                "request": { "url": "https://example.com/poll" }
                            }),
                            session,
                        ));
                    }
                    frames.push(lifecycle("DOMContentLoaded"));
                    frames.push(lifecycle("load"));
                    if self.idle_event {
                        frames.push(lifecycle("networkIdle"));
                    }
                    frames
                }

                "Page.printToPDF" => {
                    if let Some((code, message)) = &self.print_error {
                        return vec![reply_error(request, *code, message)];
                    }
                    if request["params"]["transferMode"] == "ReturnAsStream" {
                        reads = 0;
                        vec![reply(request, json!({ "data": "", "stream": "H1" }))]
                    } else {
                        vec![reply(request, json!({ "data": BASE64.encode(self.pdf()) }))]
                    }
                }

                "IO.read" => {
                    let chunk = self.pdf_chunks.get(reads).cloned().unwrap_or_default();
                    reads += 1;
                    let eof = reads >= self.pdf_chunks.len();
                    vec![reply(
                        request,
                        json!({ "data": BASE64.encode(chunk), "base64Encoded": true, "eof": eof }),
                    )]
                }

                "Page.captureScreenshot" => {
                    vec![reply(request, json!({ "data": BASE64.encode(&self.image) }))]
                }

                "Runtime.evaluate" => {
                    let expression = request["params"]["expression"].as_str().unwrap_or_default();
                    let value = if expression == "window.status" {
                        json!(self.window_status)
                    } else {
                        json!(null)
                    };
                    vec![reply(request, json!({ "result": { "type": "string", "value": value } }))]
                }

                "Browser.getVersion" => vec![reply(
                    request,
                    json!({ "product": "HeadlessChrome/120.0.0.0", "protocolVersion": "1.3" }),
                )],

                _ => vec![reply(request, json!({}))],
            }
        }
    }
}
