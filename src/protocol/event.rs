//! Event message types.
//!
//! Events are notifications pushed by the browser without an `id`.
//!
//! # Event Types
//!
//! | Domain | Events |
//! |--------|--------|
//! | `Page` | `lifecycleEvent`, `domContentEventFired`, `loadEventFired` |
//! | `Network` | `requestWillBeSent`, `loadingFinished`, `loadingFailed` |
//! | `Browser` | `downloadProgress` |
//! | `Inspector` | `targetCrashed`, `detached` |
//! | `Target` | `detachedFromTarget` |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::SessionId;

// ============================================================================
// Event
// ============================================================================

/// An event notification from the browser.
///
/// # Format
///
/// ```json
/// {
///   "method": "Page.lifecycleEvent",
///   "params": { "frameId": "...", "loaderId": "...", "name": "DOMContentLoaded" },
///   "sessionId": "8F3A..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,

    /// Session that emitted the event, absent for browser-level events.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value, session_id: Option<SessionId>) -> Self {
        Self {
            method: method.into(),
            params,
            session_id,
        }
    }

    /// Returns the domain name from the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        self.parse_internal()
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Frame lifecycle milestone (`init`, `DOMContentLoaded`, `load`, `networkIdle`, ...).
    PageLifecycle {
        /// Frame ID.
        frame_id: String,
        /// Loader ID of the navigation the milestone belongs to.
        loader_id: String,
        /// Milestone name.
        name: String,
    },

    /// DOM content loaded in the main frame.
    PageDomContentEventFired,

    /// Main frame load complete.
    PageLoadEventFired,

    /// Network request about to be sent.
    NetworkRequestWillBeSent {
        /// Request ID.
        request_id: String,
        /// Loader ID.
        loader_id: String,
        /// Resource type (`Document`, `Script`, ...).
        resource_type: String,
        /// Request URL.
        url: String,
    },

    /// Network request finished.
    NetworkLoadingFinished {
        /// Request ID.
        request_id: String,
    },

    /// Network request failed.
    NetworkLoadingFailed {
        /// Request ID.
        request_id: String,
        /// Resource type.
        resource_type: String,
        /// Error text.
        error_text: String,
        /// Whether the request was canceled.
        canceled: bool,
    },

    /// Download progress update.
    BrowserDownloadProgress {
        /// Download GUID.
        guid: String,
        /// `inProgress`, `completed` or `canceled`.
        state: String,
        /// Bytes received so far.
        received_bytes: u64,
        /// Total bytes expected.
        total_bytes: u64,
    },

    /// Renderer crashed.
    InspectorTargetCrashed,

    /// Debugging session detached.
    InspectorDetached {
        /// Detach reason.
        reason: String,
    },

    /// Session detached from its target.
    TargetDetachedFromTarget {
        /// Detached session.
        session_id: String,
    },

    /// Unknown event type.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// Event Parsing Implementation
// ============================================================================

impl Event {
    /// Internal parsing implementation.
    fn parse_internal(&self) -> ParsedEvent {
        match self.method.as_str() {
            "Page.lifecycleEvent" => ParsedEvent::PageLifecycle {
                frame_id: self.get_string("frameId"),
                loader_id: self.get_string("loaderId"),
                name: self.get_string("name"),
            },

            "Page.domContentEventFired" => ParsedEvent::PageDomContentEventFired,

            "Page.loadEventFired" => ParsedEvent::PageLoadEventFired,

            "Network.requestWillBeSent" => ParsedEvent::NetworkRequestWillBeSent {
                request_id: self.get_string("requestId"),
                loader_id: self.get_string("loaderId"),
                resource_type: self.get_string_or("type", "Other"),
                url: self
                    .params
                    .get("request")
                    .and_then(|r| r.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },

            "Network.loadingFinished" => ParsedEvent::NetworkLoadingFinished {
                request_id: self.get_string("requestId"),
            },

            "Network.loadingFailed" => ParsedEvent::NetworkLoadingFailed {
                request_id: self.get_string("requestId"),
                resource_type: self.get_string_or("type", "Other"),
                error_text: self.get_string("errorText"),
                canceled: self.get_bool("canceled"),
            },

            "Browser.downloadProgress" => ParsedEvent::BrowserDownloadProgress {
                guid: self.get_string("guid"),
                state: self.get_string("state"),
                received_bytes: self.get_u64("receivedBytes"),
                total_bytes: self.get_u64("totalBytes"),
            },

            "Inspector.targetCrashed" => ParsedEvent::InspectorTargetCrashed,

            "Inspector.detached" => ParsedEvent::InspectorDetached {
                reason: self.get_string("reason"),
            },

            "Target.detachedFromTarget" => ParsedEvent::TargetDetachedFromTarget {
                session_id: self.get_string("sessionId"),
            },

            _ => ParsedEvent::Unknown {
                method: self.method.clone(),
                params: self.params.clone(),
            },
        }
    }

    /// Gets a string from params.
    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.get_string_or(key, "")
    }

    /// Gets a string from params with default.
    #[inline]
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    }

    /// Gets a u64 from params. Accepts floats, which CDP uses for byte counts.
    #[inline]
    fn get_u64(&self, key: &str) -> u64 {
        self.params
            .get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
            .unwrap_or_default()
    }

    /// Gets a bool from params.
    #[inline]
    fn get_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
