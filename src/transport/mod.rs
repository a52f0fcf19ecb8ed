//! WebSocket transport layer.
//!
//! This module handles communication between the local end (Rust) and the
//! browser's debugging endpoint via WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Page (Rust)    │                              │  Chromium       │
//! │                 │         WebSocket            │                 │
//! │  Connection     │─────────────────────────────►│  DevTools       │
//! │  PendingCalls   │◄─────────────────────────────│  endpoint       │
//! │  EventBus       │   responses + events         │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::open` - Connect to the endpoint, spawn the receive loop
//! 2. `Connection::send` - Correlated calls, optionally session-routed
//! 3. `Connection::subscribe` - Event subscriptions
//! 4. `Connection::close` - Fail pending calls, close subscriptions
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bus` | Event fan-out to subscriptions |
//! | `connection` | WebSocket connection and receive loop |
//! | `dispatcher` | Pending-call table |

// ============================================================================
// Submodules
// ============================================================================

/// Event fan-out.
pub mod bus;

/// WebSocket connection and receive loop.
pub mod connection;

/// Pending-call table.
pub mod dispatcher;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use bus::{EventBus, EventFilter, Subscription, SubscriptionCloser};
pub use connection::{Connection, ConnectionConfig};
pub use dispatcher::PendingCalls;
