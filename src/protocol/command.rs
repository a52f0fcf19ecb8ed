//! Command definitions organized by domain.
//!
//! Commands follow the DevTools `Domain.method` format.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Target` | Create, attach, close targets |
//! | `Page` | Lifecycle, navigation, print, screenshot |
//! | `Network` | Enable, user agent, headers, URL blocking |
//! | `Emulation` | Viewport, media type |
//! | `Runtime` | Script evaluation |
//! | `IO` | Stream reads |
//! | `Browser` | Version, close |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::{StreamHandle, TargetId};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Target domain commands.
    Target(TargetCommand),
    /// Page domain commands.
    Page(PageCommand),
    /// Network domain commands.
    Network(NetworkCommand),
    /// Emulation domain commands.
    Emulation(EmulationCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// IO domain commands.
    Io(IoCommand),
    /// Browser domain commands.
    Browser(BrowserCommand),
}

impl Command {
    /// Splits the command into its method name and params object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_parts(&self) -> Result<(String, Value)> {
        let mut value = serde_json::to_value(self)?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::config("command did not serialize to an object"))?;

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(Error::config("command serialized without a method")),
        };
        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok((method, params))
    }

    /// Returns the `Domain.method` name.
    #[must_use]
    pub fn method(&self) -> String {
        self.to_parts().map(|(m, _)| m).unwrap_or_default()
    }
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands for tab management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// Open a new tab.
    #[serde(rename = "Target.createTarget")]
    CreateTarget {
        /// Initial URL.
        url: String,
    },

    /// Attach to a target in flattened mode.
    #[serde(rename = "Target.attachToTarget")]
    AttachToTarget {
        /// Target to attach to.
        #[serde(rename = "targetId")]
        target_id: TargetId,
        /// Route session traffic over the browser connection.
        flatten: bool,
    },

    /// Close a target.
    #[serde(rename = "Target.closeTarget")]
    CloseTarget {
        /// Target to close.
        #[serde(rename = "targetId")]
        target_id: TargetId,
    },
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable page events.
    #[serde(rename = "Page.enable")]
    Enable,

    /// Toggle `Page.lifecycleEvent` notifications.
    #[serde(rename = "Page.setLifecycleEventsEnabled")]
    SetLifecycleEventsEnabled {
        /// Whether to emit lifecycle events.
        enabled: bool,
    },

    /// Navigate to URL.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },

    /// Stop loading the current page.
    #[serde(rename = "Page.stopLoading")]
    StopLoading,

    /// Print the page to PDF. Params are forwarded verbatim.
    #[serde(rename = "Page.printToPDF")]
    PrintToPdf(Value),

    /// Capture a screenshot. Params are forwarded verbatim.
    #[serde(rename = "Page.captureScreenshot")]
    CaptureScreenshot(Value),
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Enable network events.
    #[serde(rename = "Network.enable")]
    Enable,

    /// Override the user agent string.
    #[serde(rename = "Network.setUserAgentOverride")]
    SetUserAgentOverride {
        /// User agent to report.
        #[serde(rename = "userAgent")]
        user_agent: String,
    },

    /// Send extra headers with every request.
    #[serde(rename = "Network.setExtraHTTPHeaders")]
    SetExtraHttpHeaders {
        /// Header name to value.
        headers: Map<String, Value>,
    },

    /// Block requests matching URL patterns.
    #[serde(rename = "Network.setBlockedURLs")]
    SetBlockedUrls {
        /// Patterns with `*` wildcards.
        urls: Vec<String>,
    },
}

// ============================================================================
// Emulation Commands
// ============================================================================

/// Emulation domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum EmulationCommand {
    /// Override the viewport.
    #[serde(rename = "Emulation.setDeviceMetricsOverride")]
    SetDeviceMetricsOverride {
        /// Viewport width in CSS pixels.
        width: u32,
        /// Viewport height in CSS pixels.
        height: u32,
        /// Device pixel ratio.
        #[serde(rename = "deviceScaleFactor")]
        device_scale_factor: f64,
        /// Emulate a mobile device.
        mobile: bool,
    },

    /// Emulate a CSS media type (`print` or `screen`).
    #[serde(rename = "Emulation.setEmulatedMedia")]
    SetEmulatedMedia {
        /// Media type; empty disables emulation.
        media: String,
    },
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Evaluate an expression in the page.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// JavaScript expression.
        expression: String,
        /// Return the result by value.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,
        /// Await a returned promise.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,
    },
}

// ============================================================================
// IO Commands
// ============================================================================

/// IO domain commands for reading browser-side streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum IoCommand {
    /// Read the next chunk of a stream.
    #[serde(rename = "IO.read")]
    Read {
        /// Stream handle.
        handle: StreamHandle,
        /// Maximum bytes to read.
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u32>,
    },

    /// Close a stream.
    #[serde(rename = "IO.close")]
    Close {
        /// Stream handle.
        handle: StreamHandle,
    },
}

// ============================================================================
// Browser Commands
// ============================================================================

/// Browser domain commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum BrowserCommand {
    /// Query product and protocol version.
    #[serde(rename = "Browser.getVersion")]
    GetVersion,

    /// Close the browser gracefully.
    #[serde(rename = "Browser.close")]
    Close,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_unit_command_has_empty_params() {
        let (method, params) = Command::Page(PageCommand::Enable)
            .to_parts()
            .expect("parts");
        assert_eq!(method, "Page.enable");
        assert_eq!(params, json!({}));
    }

    #[test]
    fn test_attach_uses_camel_case() {
        let command = Command::Target(TargetCommand::AttachToTarget {
            target_id: TargetId::from("T1"),
            flatten: true,
        });
        let (method, params) = command.to_parts().expect("parts");
        assert_eq!(method, "Target.attachToTarget");
        assert_eq!(params, json!({ "targetId": "T1", "flatten": true }));
    }

    #[test]
    fn test_print_params_forwarded_verbatim() {
        let options = json!({ "marginTop": -1, "landscape": true, "custom": [1, 2] });
        let (method, params) = Command::Page(PageCommand::PrintToPdf(options.clone()))
            .to_parts()
            .expect("parts");
        assert_eq!(method, "Page.printToPDF");
        assert_eq!(params, options);
    }

    #[test]
    fn test_io_read_omits_size_when_unset() {
        let command = Command::Io(IoCommand::Read {
            handle: StreamHandle::from("7"),
            size: None,
        });
        let (_, params) = command.to_parts().expect("parts");
        assert_eq!(params, json!({ "handle": "7" }));
    }

    #[test]
    fn test_method_name() {
        assert_eq!(Command::Browser(BrowserCommand::Close).method(), "Browser.close");
        assert_eq!(
            Command::Network(NetworkCommand::SetBlockedUrls { urls: vec![] }).method(),
            "Network.setBlockedURLs"
        );
    }
}
