//! Error types for the converter.
//!
//! Every fallible operation returns [`Result<T>`] which uses [`Error`].
//! Each variant belongs to exactly one [`ErrorKind`], so callers can route a
//! failure without matching on individual variants.
//!
//! # Usage
//!
//! ```ignore
//! use chromium_html_to_pdf::{ErrorKind, Result};
//!
//! async fn example(converter: &Converter, request: ConversionRequest) -> Result<()> {
//!     match converter.convert(request).await {
//!         Ok(result) => println!("{} bytes", result.byte_size),
//!         Err(e) if e.kind() == ErrorKind::Timeout => println!("browser never answered"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Kind | Variants |
//! |------|----------|
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::WebSocket`], [`Error::TooManyPendingCalls`] |
//! | Protocol | [`Error::Protocol`], [`Error::NavigationFailed`] |
//! | Timeout | [`Error::CallTimeout`], [`Error::Timeout`] |
//! | Decode | [`Error::UnexpectedResponse`], [`Error::Json`], [`Error::Base64`] |
//! | Process | [`Error::BrowserNotFound`], [`Error::ProcessLaunchFailed`], [`Error::ProcessExited`], [`Error::ShutdownFailed`], [`Error::TargetCrashed`] |
//! | Session | [`Error::SessionClosed`] |
//! | Config | [`Error::Config`] |
//! | Io | [`Error::Io`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CallId, SessionId};
use crate::protocol::ProtocolError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// ErrorKind
// ============================================================================

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection refused, reset, or closed mid-operation.
    Transport,
    /// The browser rejected a command.
    Protocol,
    /// A call or readiness wait exceeded its deadline.
    Timeout,
    /// A frame or result body did not have the expected shape.
    Decode,
    /// The browser process failed to start, crashed, or would not exit.
    Process,
    /// A command was issued on a closed page session.
    Session,
    /// Invalid configuration.
    Config,
    /// Local I/O failure (output sink, temp files).
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Timeout => "timeout",
            Self::Decode => "decode",
            Self::Process => "process",
            Self::Session => "session",
            Self::Config => "config",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when converter or launch configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Process Errors
    // ========================================================================
    /// Browser binary not found at path.
    #[error("Browser not found at: {path}")]
    BrowserNotFound {
        /// Path where the browser was expected.
        path: PathBuf,
    },

    /// Failed to launch the browser process.
    #[error("Failed to launch browser: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// The browser process exited unexpectedly.
    #[error("Browser process exited: {status}")]
    ProcessExited {
        /// Exit status as reported by the OS.
        status: String,
    },

    /// The browser process survived forced termination.
    #[error("Browser process {pid} did not exit after {timeout_ms}ms")]
    ShutdownFailed {
        /// Process ID.
        pid: u32,
        /// Milliseconds waited after the kill signal.
        timeout_ms: u64,
    },

    /// The renderer for a target crashed or the target was detached.
    #[error("Target crashed or detached: {session_id}")]
    TargetCrashed {
        /// Session attached to the crashed target.
        session_id: SessionId,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket connection closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Too many calls in flight on one connection.
    #[error("Too many pending calls: {pending}/{max}")]
    TooManyPendingCalls {
        /// Calls currently in flight.
        pending: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The browser returned an error for a call.
    #[error("Protocol error in {method}: {error}")]
    Protocol {
        /// Method of the rejected call.
        method: String,
        /// Error object returned by the browser, unmodified.
        error: ProtocolError,
    },

    /// The browser reported a navigation failure.
    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed {
        /// URL being navigated to.
        url: String,
        /// Error text reported by the browser.
        reason: String,
    },

    // ========================================================================
    // Timeout Errors
    // ========================================================================
    /// A single call did not get a response in time.
    #[error("Call {call_id} ({method}) timed out after {timeout_ms}ms")]
    CallTimeout {
        /// The call that timed out.
        call_id: CallId,
        /// Method of the call.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// An operation exceeded its deadline.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Decode Errors
    // ========================================================================
    /// A result body lacked fields the caller needs.
    #[error("Unexpected response to {method}: {message}")]
    UnexpectedResponse {
        /// Method of the call.
        method: String,
        /// What was wrong with the body.
        message: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 payload could not be decoded.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Command issued on a page session that is already closed or failed.
    #[error("Session closed: {session_id}")]
    SessionClosed {
        /// The closed session.
        session_id: SessionId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a browser not found error.
    #[inline]
    pub fn browser_not_found(path: impl Into<PathBuf>) -> Self {
        Self::BrowserNotFound { path: path.into() }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(message: impl Into<String>) -> Self {
        Self::ProcessLaunchFailed {
            message: message.into(),
        }
    }

    /// Creates a process exited error.
    #[inline]
    pub fn process_exited(status: impl fmt::Display) -> Self {
        Self::ProcessExited {
            status: status.to_string(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error for a rejected call.
    #[inline]
    pub fn protocol(method: impl Into<String>, error: ProtocolError) -> Self {
        Self::Protocol {
            method: method.into(),
            error,
        }
    }

    /// Creates a navigation failed error.
    #[inline]
    pub fn navigation_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NavigationFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a call timeout error.
    #[inline]
    pub fn call_timeout(call_id: CallId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::CallTimeout {
            call_id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates an unexpected response error.
    #[inline]
    pub fn unexpected_response(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(session_id: SessionId) -> Self {
        Self::SessionClosed { session_id }
    }
}

// ============================================================================
// Error Classification
// ============================================================================

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::BrowserNotFound { .. }
            | Self::ProcessLaunchFailed { .. }
            | Self::ProcessExited { .. }
            | Self::ShutdownFailed { .. }
            | Self::TargetCrashed { .. } => ErrorKind::Process,
            Self::Connection { .. }
            | Self::ConnectionClosed
            | Self::TooManyPendingCalls { .. }
            | Self::WebSocket(_) => ErrorKind::Transport,
            Self::Protocol { .. } | Self::NavigationFailed { .. } => ErrorKind::Protocol,
            Self::CallTimeout { .. } | Self::Timeout { .. } => ErrorKind::Timeout,
            Self::UnexpectedResponse { .. } | Self::Json(_) | Self::Base64(_) => {
                ErrorKind::Decode
            }
            Self::SessionClosed { .. } => ErrorKind::Session,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns the browser's error code if this is a protocol rejection.
    #[inline]
    #[must_use]
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { error, .. } => Some(error.code),
            _ => None,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Returns `true` if the browser rejected a command.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    /// Returns `true` if this is a process error.
    #[inline]
    #[must_use]
    pub fn is_process_error(&self) -> bool {
        self.kind() == ErrorKind::Process
    }

    /// Returns `true` if the browser instance should be considered unusable.
    ///
    /// Transport and process failures leave the instance in an unknown state;
    /// a converter that sees one will relaunch before the next conversion.
    #[inline]
    #[must_use]
    pub fn is_fatal_to_browser(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Process)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind as IoErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_protocol_error_keeps_code_and_message() {
        let err = Error::protocol(
            "Page.printToPDF",
            ProtocolError {
                code: -32000,
                message: "Printing failed".into(),
                data: None,
            },
        );

        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.protocol_code(), Some(-32000));
        assert!(err.to_string().contains("Printing failed"));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Transport);
        assert_eq!(Error::timeout("load", 10).kind(), ErrorKind::Timeout);
        assert_eq!(
            Error::call_timeout(CallId::new(3), "Page.enable", 10).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            Error::process_exited("exit status: 1").kind(),
            ErrorKind::Process
        );
        assert_eq!(
            Error::unexpected_response("IO.read", "missing data").kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            Error::session_closed(SessionId::from("abc")).kind(),
            ErrorKind::Session
        );
        assert_eq!(Error::config("bad").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_predicates() {
        assert!(Error::timeout("x", 1).is_timeout());
        assert!(!Error::ConnectionClosed.is_timeout());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::navigation_failed("http://x", "net::ERR_NAME_NOT_RESOLVED").is_protocol_error());
        assert!(Error::process_launch_failed("no such file").is_process_error());
    }

    #[test]
    fn test_is_fatal_to_browser() {
        assert!(Error::ConnectionClosed.is_fatal_to_browser());
        assert!(Error::process_exited("signal: 9").is_fatal_to_browser());
        assert!(!Error::timeout("x", 1).is_fatal_to_browser());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(IoErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::Transport.to_string(), "transport");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
