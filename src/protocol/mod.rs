//! DevTools protocol message types.
//!
//! This module defines the wire format exchanged with the browser.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Browser | Command call |
//! | `Response` | Browser → Local | Result or error for a call |
//! | `Event` | Browser → Local | Unsolicited notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Inbound frame classification |
//! | `command` | Command definitions by domain |
//! | `event` | Event types |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound frame classification.
pub mod codec;

/// Command definitions organized by domain.
pub mod command;

/// Event message types.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{DecodeError, Incoming};
pub use command::{
    BrowserCommand, Command, EmulationCommand, IoCommand, NetworkCommand, PageCommand,
    RuntimeCommand, TargetCommand,
};
pub use event::{Event, ParsedEvent};
pub use request::{ProtocolError, Request, Response};
