//! Page readiness state machine.
//!
//! [`ReadinessTracker`] is pure: it consumes parsed events and clock readings
//! and never touches the connection, so every transition is testable without
//! a browser.
//!
//! # States
//!
//! ```text
//! Created ─► Navigating ─► DomReady ─► NetworkIdle ─► Converting ─► Closed
//!               ▲  │           │            │             │
//!               └──┴───────────┴────────────┘ (re-navigate)
//!
//! any non-terminal ─► Failed
//! ```
//!
//! | Transition | Trigger |
//! |------------|---------|
//! | `Navigating → DomReady` | `DOMContentLoaded` or `load` |
//! | `DomReady → NetworkIdle` | `networkIdle`, quiet window with nothing in flight, or fallback |
//! | `→ Failed` | navigation error, crash, detach, transport closed, deadline |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use crate::deadline::saturating_add;
use crate::error::Error;
use crate::identifiers::SessionId;
use crate::protocol::ParsedEvent;

// ============================================================================
// Constants
// ============================================================================

/// Default time with no request in flight before the page counts as idle.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(500);

// ============================================================================
// PageState
// ============================================================================

/// Readiness of a page session.
///
/// Ordered: a later variant is further along, except `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageState {
    /// Attached, nothing loaded yet.
    Created,
    /// Navigation issued.
    Navigating,
    /// DOM parsed.
    DomReady,
    /// Network settled; ready to convert.
    NetworkIdle,
    /// Print or capture in progress.
    Converting,
    /// Target closed.
    Closed,
    /// Unrecoverable failure.
    Failed,
}

impl PageState {
    /// Returns `true` for `Closed` and `Failed`.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Returns `true` once the page may be converted.
    #[inline]
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::NetworkIdle
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Navigating => "navigating",
            Self::DomReady => "dom-ready",
            Self::NetworkIdle => "network-idle",
            Self::Converting => "converting",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// IdlePolicy
// ============================================================================

/// When a page with its DOM ready counts as settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    /// Time with zero requests in flight.
    pub quiet_window: Duration,
    /// Give up waiting for quiet after this long past DOM ready.
    pub fallback: Option<Duration>,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            quiet_window: DEFAULT_QUIET_WINDOW,
            fallback: None,
        }
    }
}

impl IdlePolicy {
    /// Sets the quiet window.
    #[must_use]
    pub fn with_quiet_window(mut self, window: Duration) -> Self {
        self.quiet_window = window;
        self
    }

    /// Sets the fallback.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Duration) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

// ============================================================================
// PageFailure
// ============================================================================

/// Why a page entered `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFailure {
    /// The browser reported a navigation error.
    Navigation {
        /// URL being loaded.
        url: String,
        /// Browser error text.
        reason: String,
    },
    /// Renderer crashed.
    Crashed,
    /// Session detached from its target.
    Detached(String),
    /// The connection closed.
    ConnectionClosed,
    /// The deadline passed while waiting for readiness.
    DeadlineExceeded {
        /// Budget of the deadline that expired.
        budget_ms: u64,
    },
    /// Print, capture or a pre-capture hook failed.
    Conversion(String),
}

impl PageFailure {
    /// Converts the failure into the error reported to callers.
    #[must_use]
    pub fn to_error(&self, session_id: &SessionId) -> Error {
        match self {
            Self::Navigation { url, reason } => Error::navigation_failed(url, reason),
            Self::Crashed | Self::Detached(_) => Error::TargetCrashed {
                session_id: session_id.clone(),
            },
            Self::ConnectionClosed => Error::ConnectionClosed,
            Self::DeadlineExceeded { budget_ms } => {
                Error::timeout("wait for page readiness", *budget_ms)
            }
            Self::Conversion(_) => Error::session_closed(session_id.clone()),
        }
    }
}

// ============================================================================
// ReadinessTracker
// ============================================================================

/// Event-driven readiness of one page.
#[derive(Debug)]
pub struct ReadinessTracker {
    state: PageState,
    url: String,
    loader_id: Option<String>,
    stale_loaders: FxHashSet<String>,
    in_flight: FxHashSet<String>,
    last_activity: Instant,
    dom_ready_at: Option<Instant>,
    idle_signalled: bool,
    failure: Option<PageFailure>,
}

impl ReadinessTracker {
    /// Creates a tracker in `Created`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            state: PageState::Created,
            url: String::new(),
            loader_id: None,
            stale_loaders: FxHashSet::default(),
            in_flight: FxHashSet::default(),
            last_activity: now,
            dom_ready_at: None,
            idle_signalled: false,
            failure: None,
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> PageState {
        self.state
    }

    /// Why the page failed, if it did.
    #[inline]
    #[must_use]
    pub fn failure(&self) -> Option<&PageFailure> {
        self.failure.as_ref()
    }

    /// Requests currently in flight.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Loader id of the current navigation, once known.
    #[inline]
    #[must_use]
    pub fn loader_id(&self) -> Option<&str> {
        self.loader_id.as_deref()
    }

    // ========================================================================
    // Transitions driven by the page
    // ========================================================================

    /// Starts (or restarts) a navigation.
    ///
    /// Signals from the previous navigation are discarded; events still
    /// carrying its loader id are ignored from now on. Returns `false` if the
    /// page is `Closed` or `Failed`.
    pub fn begin_navigation(&mut self, url: &str, now: Instant) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        if let Some(previous) = self.loader_id.take() {
            self.stale_loaders.insert(previous);
        }
        self.url = url.to_string();
        self.in_flight.clear();
        self.last_activity = now;
        self.dom_ready_at = None;
        self.idle_signalled = false;
        self.transition(PageState::Navigating);
        true
    }

    /// Records the loader id returned by `Page.navigate`.
    pub fn set_loader(&mut self, loader_id: &str) {
        if !loader_id.is_empty() {
            self.loader_id = Some(loader_id.to_string());
        }
    }

    /// Marks the start of print or capture. Only valid from `NetworkIdle`.
    pub fn begin_conversion(&mut self) -> bool {
        if self.state != PageState::NetworkIdle {
            return false;
        }
        self.transition(PageState::Converting);
        true
    }

    /// Marks the target closed. A failed page stays `Failed`.
    pub fn close(&mut self) {
        if self.state != PageState::Failed {
            self.transition(PageState::Closed);
        }
    }

    /// Fails the page. No effect once terminal.
    pub fn fail(&mut self, failure: PageFailure) {
        if self.state.is_terminal() {
            return;
        }
        warn!(from = %self.state, ?failure, "Page failed");
        self.failure = Some(failure);
        self.state = PageState::Failed;
    }

    // ========================================================================
    // Transitions driven by events and time
    // ========================================================================

    /// Applies one event. Returns the new state if it changed.
    pub fn apply(&mut self, event: &ParsedEvent, now: Instant) -> Option<PageState> {
        let before = self.state;
        if before.is_terminal() {
            return None;
        }

        match event {
            ParsedEvent::InspectorTargetCrashed => self.fail(PageFailure::Crashed),

            ParsedEvent::InspectorDetached { reason } => {
                self.fail(PageFailure::Detached(reason.clone()));
            }

            ParsedEvent::TargetDetachedFromTarget { .. } => {
                self.fail(PageFailure::Detached("target detached".into()));
            }

            _ if before == PageState::Created => {}

            ParsedEvent::PageLifecycle {
                loader_id, name, ..
            } => {
                if self.is_stale(loader_id) {
                    trace!(loader_id, name, "Ignoring stale lifecycle event");
                    return None;
                }
                if self.loader_id.is_none() && !loader_id.is_empty() {
                    self.loader_id = Some(loader_id.clone());
                }
                match name.as_str() {
                    "DOMContentLoaded" | "load" => self.dom_ready(now),
                    "networkIdle" => self.network_idle_signal(),
                    _ => {}
                }
            }

            ParsedEvent::PageDomContentEventFired | ParsedEvent::PageLoadEventFired => {
                self.dom_ready(now);
            }

            ParsedEvent::NetworkRequestWillBeSent {
                request_id,
                loader_id,
                ..
            } => {
                // Subframes have their own loaders; only earlier navigations
                // are excluded.
                if self.stale_loaders.contains(loader_id) {
                    return None;
                }
                self.in_flight.insert(request_id.clone());
                self.last_activity = now;
            }

            ParsedEvent::NetworkLoadingFinished { request_id } => {
                if self.in_flight.remove(request_id) {
                    self.last_activity = now;
                }
            }

            ParsedEvent::NetworkLoadingFailed {
                request_id,
                error_text,
                canceled,
                ..
            } => {
                let was_tracked = self.in_flight.remove(request_id);
                if was_tracked {
                    self.last_activity = now;
                }

                // The main document request id equals the loader id.
                let is_document = self.loader_id.as_deref() == Some(request_id.as_str());
                if is_document && !canceled && self.state == PageState::Navigating {
                    let url = self.url.clone();
                    self.fail(PageFailure::Navigation {
                        url,
                        reason: error_text.clone(),
                    });
                }
            }

            _ => {}
        }

        (self.state != before).then_some(self.state)
    }

    /// Re-evaluates time-based idleness. Returns the new state if it changed.
    pub fn poll(&mut self, now: Instant, policy: &IdlePolicy) -> Option<PageState> {
        if self.state != PageState::DomReady {
            return None;
        }
        let dom_ready_at = self.dom_ready_at?;

        let quiet_since = self.last_activity.max(dom_ready_at);
        if self.in_flight.is_empty() && now.duration_since(quiet_since) >= policy.quiet_window {
            debug!(
                quiet_ms = policy.quiet_window.as_millis() as u64,
                "Network quiet"
            );
            self.transition(PageState::NetworkIdle);
            return Some(self.state);
        }

        if let Some(fallback) = policy.fallback
            && now.duration_since(dom_ready_at) >= fallback
        {
            debug!(
                in_flight = self.in_flight.len(),
                fallback_ms = fallback.as_millis() as u64,
                "Idle fallback elapsed"
            );
            self.transition(PageState::NetworkIdle);
            return Some(self.state);
        }

        None
    }

    /// Next instant at which [`ReadinessTracker::poll`] could change state.
    #[must_use]
    pub fn next_wakeup(&self, policy: &IdlePolicy) -> Option<Instant> {
        if self.state != PageState::DomReady {
            return None;
        }
        let dom_ready_at = self.dom_ready_at?;

        let quiet = self
            .in_flight
            .is_empty()
            .then(|| {
                saturating_add(self.last_activity.max(dom_ready_at), policy.quiet_window)
            });
        let fallback = policy.fallback.map(|f| saturating_add(dom_ready_at, f));

        match (quiet, fallback) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn is_stale(&self, loader_id: &str) -> bool {
        if loader_id.is_empty() {
            return false;
        }
        if self.stale_loaders.contains(loader_id) {
            return true;
        }
        self.loader_id.as_deref().is_some_and(|current| current != loader_id)
    }

    fn dom_ready(&mut self, now: Instant) {
        if self.state != PageState::Navigating {
            return;
        }
        self.dom_ready_at = Some(now);
        self.transition(PageState::DomReady);

        if self.idle_signalled {
            self.transition(PageState::NetworkIdle);
        }
    }

    fn network_idle_signal(&mut self) {
        match self.state {
            PageState::Navigating => self.idle_signalled = true,
            PageState::DomReady => self.transition(PageState::NetworkIdle),
            _ => {}
        }
    }

    fn transition(&mut self, to: PageState) {
        if self.state != to {
            debug!(from = %self.state, to = %to, "Page state");
            self.state = to;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
