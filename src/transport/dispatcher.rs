//! Pending-call table.
//!
//! Tracks every call that has been sent but not yet answered. The table is
//! shared between callers (which register and time out calls) and the
//! receive loop (which resolves them), so every mutation goes through one
//! mutex.
//!
//! A call leaves the table exactly once: resolved by its response, removed on
//! timeout or cancellation, or rejected when the connection closes. Once
//! closed, the table refuses new registrations so nothing can wait on a
//! connection that will never answer.

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, CallIdAllocator};
use crate::protocol::Response;

// ============================================================================
// Types
// ============================================================================

/// Completion slot handed to a waiting caller.
pub(crate) type CompletionSlot = oneshot::Sender<Result<Value>>;

/// A call awaiting its response.
#[derive(Debug)]
pub(crate) struct PendingCall {
    /// Method, kept for error reporting.
    pub method: String,
    /// When the call was registered.
    pub created: Instant,
    /// Where the outcome goes.
    slot: CompletionSlot,
}

/// Table state guarded by one lock.
#[derive(Debug, Default)]
struct Table {
    calls: FxHashMap<CallId, PendingCall>,
    closed: bool,
}

// ============================================================================
// PendingCalls
// ============================================================================

/// In-flight calls of one connection, keyed by [`CallId`].
#[derive(Debug)]
pub struct PendingCalls {
    ids: CallIdAllocator,
    table: Mutex<Table>,
    max_pending: usize,
}

impl PendingCalls {
    /// Creates an empty table admitting at most `max_pending` calls.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            ids: CallIdAllocator::new(),
            table: Mutex::new(Table::default()),
            max_pending,
        }
    }

    /// Allocates the next call id.
    #[inline]
    pub fn next_id(&self) -> CallId {
        self.ids.next_id()
    }

    /// Registers a call before its frame is written.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection already closed
    /// - [`Error::TooManyPendingCalls`] if the table is full
    /// - [`Error::Connection`] if `id` is already outstanding
    pub(crate) fn register(&self, id: CallId, method: &str, slot: CompletionSlot) -> Result<()> {
        let mut table = self.table.lock();

        if table.closed {
            return Err(Error::ConnectionClosed);
        }

        if table.calls.len() >= self.max_pending {
            warn!(
                pending = table.calls.len(),
                max = self.max_pending,
                "Too many pending calls"
            );
            return Err(Error::TooManyPendingCalls {
                pending: table.calls.len(),
                max: self.max_pending,
            });
        }

        if table.calls.contains_key(&id) {
            return Err(Error::connection(format!("call id {id} already in flight")));
        }

        table.calls.insert(
            id,
            PendingCall {
                method: method.to_string(),
                created: Instant::now(),
                slot,
            },
        );
        trace!(%id, method, "Call registered");
        Ok(())
    }

    /// Completes the call a response belongs to.
    ///
    /// Returns `false` if no call is waiting for this id (late or unknown
    /// response); the response is then discarded.
    pub fn resolve(&self, response: Response) -> bool {
        let id = response.id;
        let Some(call) = self.table.lock().calls.remove(&id) else {
            debug!(%id, "Discarding response for unknown or expired call");
            return false;
        };

        trace!(
            %id,
            method = %call.method,
            elapsed_ms = call.created.elapsed().as_millis() as u64,
            "Call resolved"
        );
        let outcome = response.into_result(&call.method);
        let _ = call.slot.send(outcome);
        true
    }

    /// Rejects one call with an error built from its method name.
    ///
    /// Returns `false` if the call is no longer pending.
    pub fn reject(&self, id: CallId, error: impl FnOnce(&str) -> Error) -> bool {
        let Some(call) = self.table.lock().calls.remove(&id) else {
            return false;
        };
        let _ = call.slot.send(Err(error(&call.method)));
        true
    }

    /// Removes a call without completing it (timeout or cancellation).
    pub(crate) fn remove(&self, id: CallId) -> Option<PendingCall> {
        let removed = self.table.lock().calls.remove(&id);
        if removed.is_some() {
            trace!(%id, "Call removed");
        }
        removed
    }

    /// Closes the table and rejects every outstanding call.
    ///
    /// Returns the number of calls rejected.
    pub fn fail_all(&self, error: impl Fn() -> Error) -> usize {
        let drained: Vec<PendingCall> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.calls.drain().map(|(_, call)| call).collect()
        };

        let count = drained.len();
        for call in drained {
            let _ = call.slot.send(Err(error()));
        }

        if count > 0 {
            debug!(count, "Failed pending calls on close");
        }
        count
    }

    /// Returns the number of calls in flight.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().calls.len()
    }

    /// Returns `true` if no call is in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`PendingCalls::fail_all`] has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.table.lock().closed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    fn response(id: CallId, result: Value) -> Response {
        Response {
            id,
            result: Some(result),
            error: None,
            session_id: None,
        }
    }

    #[test]
    fn test_resolve_delivers_result() {
        let table = PendingCalls::new(8);
        let id = table.next_id();
        let (tx, mut rx) = oneshot::channel();
        table.register(id, "Page.enable", tx).expect("register");

        assert!(table.resolve(response(id, json!({ "ok": true }))));
        let outcome = rx.try_recv().expect("completed").expect("success");
        assert_eq!(outcome, json!({ "ok": true }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_error_response_rejects_with_protocol_error() {
        let table = PendingCalls::new(8);
        let id = table.next_id();
        let (tx, mut rx) = oneshot::channel();
        table.register(id, "Page.printToPDF", tx).expect("register");

        let response: Response = serde_json::from_value(json!({
            "id": id.get(),
            "error": { "code": -32000, "message": "Printing failed" }
        }))
        .expect("response");
        table.resolve(response);

        let err = rx.try_recv().expect("completed").unwrap_err();
        assert_eq!(err.protocol_code(), Some(-32000));
    }

    #[test]
    fn test_unknown_response_is_discarded() {
        let table = PendingCalls::new(8);
        let id = table.next_id();
        let (tx, mut rx) = oneshot::channel();
        table.register(id, "Page.enable", tx).expect("register");

        assert!(!table.resolve(response(CallId::new(999), json!({}))));
        assert_eq!(table.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_late_response_after_remove_is_discarded() {
        let table = PendingCalls::new(8);
        let id = table.next_id();
        let (tx, _rx) = oneshot::channel();
        table.register(id, "Page.navigate", tx).expect("register");

        let removed = table.remove(id).expect("was pending");
        assert_eq!(removed.method, "Page.navigate");
        assert!(!table.resolve(response(id, json!({}))));
    }

    #[test]
    fn test_fail_all_rejects_and_closes() {
        let table = PendingCalls::new(8);
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let id = table.next_id();
            let (tx, rx) = oneshot::channel();
            table.register(id, "Runtime.evaluate", tx).expect("register");
            receivers.push(rx);
        }

        assert_eq!(table.fail_all(|| Error::ConnectionClosed), 3);
        for mut rx in receivers {
            let err = rx.try_recv().expect("completed").unwrap_err();
            assert!(matches!(err, Error::ConnectionClosed));
        }

        let (tx, _rx) = oneshot::channel();
        let err = table.register(table.next_id(), "Page.enable", tx).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(table.is_closed());
    }

    #[test]
    fn test_capacity_limit() {
        let table = PendingCalls::new(1);
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        table.register(table.next_id(), "a", tx1).expect("first fits");
        let err = table.register(table.next_id(), "b", tx2).unwrap_err();
        assert!(matches!(err, Error::TooManyPendingCalls { pending: 1, max: 1 }));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let table = PendingCalls::new(4);
        let id = CallId::new(5);
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        table.register(id, "a", tx1).expect("first");
        assert!(table.register(id, "b", tx2).is_err());
    }

    #[test]
    fn test_reject_uses_method() {
        let table = PendingCalls::new(4);
        let id = table.next_id();
        let (tx, mut rx) = oneshot::channel();
        table.register(id, "IO.read", tx).expect("register");

        assert!(table.reject(id, |method| Error::unexpected_response(method, "bad body")));
        let err = rx.try_recv().expect("completed").unwrap_err();
        assert!(err.to_string().contains("IO.read"));
        assert!(!table.reject(id, |_| Error::ConnectionClosed));
    }

    proptest! {
        /// Responses delivered in any order, mixed with unknown ids, resolve
        /// every call exactly once with its own payload.
        #[test]
        fn prop_each_call_resolves_once_with_own_id(
            order in Just((0..32usize).collect::<Vec<_>>()).prop_shuffle(),
            strays in proptest::collection::vec(1000u64..2000, 0..8),
        ) {
            let table = PendingCalls::new(64);
            let mut receivers = Vec::new();
            let mut ids = Vec::new();
            for _ in 0..order.len() {
                let id = table.next_id();
                let (tx, rx) = oneshot::channel();
                table.register(id, "Runtime.evaluate", tx).expect("register");
                ids.push(id);
                receivers.push(rx);
            }

            for stray in &strays {
                let matched = table.resolve(response(CallId::new(*stray), json!({})));
                prop_assert!(!matched);
            }
            for &index in &order {
                let id = ids[index];
                let first = table.resolve(response(id, json!({ "echo": id.get() })));
                let duplicate = table.resolve(response(id, json!({ "echo": 0 })));
                prop_assert!(first);
                prop_assert!(!duplicate);
            }

            prop_assert!(table.is_empty());
            for (id, mut rx) in ids.into_iter().zip(receivers) {
                let value = rx.try_recv().expect("completed").expect("success");
                prop_assert_eq!(value["echo"].as_u64(), Some(id.get()));
            }
        }
    }
}
