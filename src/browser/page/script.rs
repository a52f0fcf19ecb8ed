//! JavaScript evaluation.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::protocol::{Command, ProtocolError, RuntimeCommand};

use super::Page;

/// Code CDP uses for generic server-side failures.
const EVALUATION_ERROR_CODE: i64 = -32000;

// ============================================================================
// Page - Script Execution
// ============================================================================

impl Page {
    /// Evaluates an expression and returns its value.
    ///
    /// Promises are awaited. A thrown exception is reported as
    /// [`Error::Protocol`] with the exception details as `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the script throws.
    pub async fn evaluate(&self, expression: &str, deadline: &Deadline) -> Result<Value> {
        debug!(
            session_id = %self.inner.session_id,
            script_len = expression.len(),
            "Evaluating script"
        );

        let result = self
            .send(
                Command::Runtime(RuntimeCommand::Evaluate {
                    expression: expression.to_string(),
                    return_by_value: true,
                    await_promise: true,
                }),
                deadline,
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("script threw")
                .to_string();
            return Err(Error::protocol(
                "Runtime.evaluate",
                ProtocolError {
                    code: EVALUATION_ERROR_CODE,
                    message,
                    data: Some(details.clone()),
                },
            ));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Polls `window.status` until it equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the deadline passes first.
    pub async fn wait_for_window_status(
        &self,
        expected: &str,
        interval: Duration,
        deadline: &Deadline,
    ) -> Result<()> {
        loop {
            let status = self.evaluate("window.status", deadline).await?;
            if status.as_str() == Some(expected) {
                debug!(status = expected, "window.status reached");
                return Ok(());
            }

            if deadline.remaining() <= interval {
                return Err(deadline.expired("wait for window.status"));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
