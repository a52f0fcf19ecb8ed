//! Core Page struct, attachment and accessors.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TargetId};
use crate::protocol::request::required_str;
use crate::protocol::{Command, NetworkCommand, PageCommand, TargetCommand};
use crate::transport::{Connection, EventFilter, Subscription, SubscriptionCloser};

use super::readiness::{PageFailure, PageState, ReadinessTracker};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for best-effort cleanup calls (stop loading, close stream, close target).
pub(crate) const CLEANUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Event domains a page listens to.
const PAGE_EVENTS: [&str; 4] = ["Page.*", "Network.*", "Inspector.*", "Target.detachedFromTarget"];

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a page.
pub(crate) struct PageInner {
    /// Browser connection the session is multiplexed over.
    pub connection: Connection,
    /// Target (tab) ID.
    pub target_id: TargetId,
    /// Flattened session ID.
    pub session_id: SessionId,
    /// Readiness state machine.
    pub tracker: Mutex<ReadinessTracker>,
    /// Events for this session, consumed while waiting for readiness.
    pub events: AsyncMutex<Subscription>,
    /// Closes `events` without waiting for a reader to release it.
    pub events_closer: SubscriptionCloser,
    /// Set once `close` has run.
    pub closed: AtomicBool,
    /// Upper bound for a single call.
    pub call_timeout: Duration,
}

// ============================================================================
// Page
// ============================================================================

/// A handle to one browser target attached in flattened mode.
///
/// Cheap to clone; clones share the same session and readiness state.
#[derive(Clone)]
pub struct Page {
    pub(crate) inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("target_id", &self.inner.target_id)
            .field("session_id", &self.inner.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Opens a blank target, attaches to it and enables the domains
    /// readiness tracking depends on.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error. A target that was created
    /// before the failure is closed again.
    pub async fn attach(
        connection: &Connection,
        call_timeout: Duration,
        deadline: &Deadline,
    ) -> Result<Self> {
        let created = connection
            .send(
                Command::Target(TargetCommand::CreateTarget {
                    url: "about:blank".to_string(),
                }),
                None,
                Some(bounded(call_timeout, deadline, "Target.createTarget")?),
            )
            .await?;
        let target_id = TargetId::from(required_str(&created, "Target.createTarget", "targetId")?);

        match Self::attach_to(connection, target_id.clone(), call_timeout, deadline).await {
            Ok(page) => Ok(page),
            Err(e) => {
                close_target(connection, &target_id).await;
                Err(e)
            }
        }
    }

    async fn attach_to(
        connection: &Connection,
        target_id: TargetId,
        call_timeout: Duration,
        deadline: &Deadline,
    ) -> Result<Self> {
        let attached = connection
            .send(
                Command::Target(TargetCommand::AttachToTarget {
                    target_id: target_id.clone(),
                    flatten: true,
                }),
                None,
                Some(bounded(call_timeout, deadline, "Target.attachToTarget")?),
            )
            .await?;
        let session_id =
            SessionId::from(required_str(&attached, "Target.attachToTarget", "sessionId")?);

        // Subscribe before enabling anything so no event is missed.
        let events =
            connection.subscribe(EventFilter::new(PAGE_EVENTS).with_session(session_id.clone()));

        let events_closer = events.closer();
        let page = Self {
            inner: Arc::new(PageInner {
                connection: connection.clone(),
                target_id,
                session_id,
                tracker: Mutex::new(ReadinessTracker::new(Instant::now())),
                events: AsyncMutex::new(events),
                events_closer,
                closed: AtomicBool::new(false),
                call_timeout,
            }),
        };

        page.send(Command::Page(PageCommand::Enable), deadline).await?;
        page.send(
            Command::Page(PageCommand::SetLifecycleEventsEnabled { enabled: true }),
            deadline,
        )
        .await?;
        page.send(Command::Network(NetworkCommand::Enable), deadline)
            .await?;

        debug!(
            target_id = %page.inner.target_id,
            session_id = %page.inner.session_id,
            "Page attached"
        );
        Ok(page)
    }
}

// ============================================================================
// Page - Accessors
// ============================================================================

impl Page {
    /// Returns the target ID.
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> &TargetId {
        &self.inner.target_id
    }

    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Returns the current readiness state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> PageState {
        self.inner.tracker.lock().state()
    }

    /// Returns `true` once the page is closed, whether or not it failed first.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Page - Close
// ============================================================================

impl Page {
    /// Closes the target. Idempotent; later commands fail with
    /// [`Error::SessionClosed`] without contacting the browser.
    ///
    /// A concurrent [`Page::wait_until_ready`] returns promptly. A page that
    /// failed stays `Failed`.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.tracker.lock().close();

        // Stop receiving events for a session that is going away.
        self.inner.events_closer.close();

        close_target(&self.inner.connection, &self.inner.target_id).await;
        debug!(session_id = %self.inner.session_id, "Page closed");
    }
}

// ============================================================================
// Page - Internal
// ============================================================================

impl Page {
    /// Sends a command on this session, bounded by `deadline`.
    pub(crate) async fn send(&self, command: Command, deadline: &Deadline) -> Result<Value> {
        self.ensure_open()?;
        let (method, params) = command.to_parts()?;
        let timeout = bounded(self.inner.call_timeout, deadline, &method)?;
        self.inner
            .connection
            .call_raw(&method, params, Some(&self.inner.session_id), Some(timeout))
            .await
    }

    /// Sends a best-effort cleanup command, ignoring the deadline.
    pub(crate) async fn send_cleanup(&self, command: Command) {
        let method = command.method();
        let result = self
            .inner
            .connection
            .send(command, Some(&self.inner.session_id), Some(CLEANUP_TIMEOUT))
            .await;
        if let Err(e) = result {
            debug!(method, error = %e, "Cleanup call failed");
        }
    }

    /// Moves the page to `Failed`. No effect once terminal.
    pub(crate) fn fail(&self, failure: PageFailure) {
        self.inner.tracker.lock().fail(failure);
    }

    /// Fails immediately if the page is closed.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::session_closed(self.inner.session_id.clone()));
        }
        Ok(())
    }

    /// The error describing why the page failed.
    pub(crate) fn failure_error(&self) -> Error {
        self.inner
            .tracker
            .lock()
            .failure()
            .map(|f| f.to_error(&self.inner.session_id))
            .unwrap_or_else(|| Error::session_closed(self.inner.session_id.clone()))
    }
}

/// Clamps a call timeout to the deadline, failing if it has already passed.
fn bounded(call_timeout: Duration, deadline: &Deadline, operation: &str) -> Result<Duration> {
    deadline.check(operation)?;
    Ok(deadline.clamp(call_timeout))
}

/// Closes a target, logging instead of failing.
async fn close_target(connection: &Connection, target_id: &TargetId) {
    let result = connection
        .send(
            Command::Target(TargetCommand::CloseTarget {
                target_id: target_id.clone(),
            }),
            None,
            Some(CLEANUP_TIMEOUT),
        )
        .await;
    if let Err(e) = result {
        warn!(%target_id, error = %e, "Failed to close target");
    }
}

// ============================================================================
// Tests
// ============================================================================
