//! Inbound frame classification.
//!
//! A frame with an integer `id` is a [`Response`]; a frame with a `method`
//! and no `id` is an [`Event`]. Anything else is a [`DecodeError`], which the
//! receive loop logs and drops.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::identifiers::CallId;

use super::{Event, Response};

// ============================================================================
// DecodeError
// ============================================================================

/// Failure to classify an inbound frame.
///
/// Only [`DecodeError::MalformedResponse`] reaches a caller, since it is the
/// only case that names a pending call.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// `id` present but not an unsigned integer.
    #[error("invalid call id: {0}")]
    InvalidId(Value),

    /// `id` is valid but the body is not a well-formed response.
    ///
    /// The receive loop rejects the matching pending call rather than
    /// leaving it to time out.
    #[error("malformed response to call {id}: {source}")]
    MalformedResponse {
        /// Call the frame was addressed to.
        id: CallId,
        /// Underlying parse failure.
        source: serde_json::Error,
    },

    /// Neither `id` nor `method`.
    #[error("frame is neither a response nor an event")]
    UnrecognizedShape,
}

// ============================================================================
// Incoming
// ============================================================================

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Reply to a call.
    Response(Response),
    /// Unsolicited notification.
    Event(Event),
}

impl Incoming {
    /// Classifies and parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed or unrecognized frames.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

        if let Some(id) = object.get("id") {
            let Some(raw) = id.as_u64() else {
                return Err(DecodeError::InvalidId(id.clone()));
            };
            return serde_json::from_value(value)
                .map(Self::Response)
                .map_err(|source| DecodeError::MalformedResponse {
                    id: CallId::new(raw),
                    source,
                });
        }

        if object.get("method").is_some_and(Value::is_string) {
            return Ok(Self::Event(serde_json::from_value(value)?));
        }

        Err(DecodeError::UnrecognizedShape)
    }
}

// ============================================================================
// Tests
// ============================================================================
