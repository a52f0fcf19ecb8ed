//! Request and Response message types.
//!
//! Defines the envelopes exchanged with the browser for command calls.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId};

use super::Command;

// ============================================================================
// Request
// ============================================================================

/// A command request sent to the browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Page.navigate",
///   "params": { "url": "https://example.com" },
///   "sessionId": "8F3A..."
/// }
/// ```
///
/// `sessionId` is omitted for browser-level commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Identifier for request/response correlation.
    pub id: CallId,

    /// Method in `Domain.method` format.
    pub method: String,

    /// Command parameters, always an object.
    pub params: Value,

    /// Flattened session the command targets.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl Request {
    /// Creates a request from raw method and params.
    ///
    /// `Null` params are normalized to an empty object.
    #[must_use]
    pub fn new(
        id: CallId,
        method: impl Into<String>,
        params: Value,
        session_id: Option<SessionId>,
    ) -> Self {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            id,
            method: method.into(),
            params,
            session_id,
        }
    }

    /// Creates a request from a typed command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the command cannot be serialized.
    pub fn from_command(
        id: CallId,
        command: &Command,
        session_id: Option<SessionId>,
    ) -> Result<Self> {
        let (method, params) = command.to_parts()?;
        Ok(Self::new(id, method, params, session_id))
    }

    /// Serializes the request into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// ProtocolError
// ============================================================================

/// Error object returned by the browser for a rejected call.
///
/// # Format
///
/// ```json
/// { "code": -32602, "message": "Invalid parameters", "data": "marginTop: ..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    /// Numeric error code.
    pub code: i64,

    /// Human-readable message.
    pub message: String,

    /// Optional nested detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)?;
        match &self.data {
            Some(Value::String(detail)) => write!(f, ": {detail}"),
            Some(detail) => write!(f, ": {detail}"),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the browser.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { "frameId": "..." } }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: CallId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object (if error).
    #[serde(default)]
    pub error: Option<ProtocolError>,

    /// Session the response belongs to.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning the browser's error if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] carrying the error object unmodified.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::protocol(method, error)),
            None => Ok(self.result.unwrap_or(Value::Object(Map::new()))),
        }
    }
}

// ============================================================================
// Result Helpers
// ============================================================================

/// Reads a required string field from a result body.
///
/// # Errors
///
/// Returns [`Error::UnexpectedResponse`] if the field is absent or not a string.
pub(crate) fn required_str<'a>(result: &'a Value, method: &str, key: &str) -> Result<&'a str> {
    result
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::unexpected_response(method, format!("missing `{key}`")))
}

// ============================================================================
// Tests
// ============================================================================
