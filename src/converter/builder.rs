//! Builder pattern for converter configuration.
//!
//! Provides a fluent API for configuring and creating [`Converter`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use chromium_html_to_pdf::Converter;
//!
//! # fn example() -> chromium_html_to_pdf::Result<()> {
//! let converter = Converter::builder()
//!     .binary("/usr/bin/chromium")
//!     .default_timeout(Duration::from_secs(30))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::browser::page::{IdlePolicy, PayloadTransfer};
use crate::error::{Error, Result};
use crate::transport::ConnectionConfig;

use super::core::Converter;
use super::options::ChromiumOptions;

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for the browser to announce its endpoint.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Overall deadline of a conversion that sets none.
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Time the browser gets to exit after `Browser.close` before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Interval between `window.status` polls.
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// BrowserSource
// ============================================================================

/// Where the converter gets its browser from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserSource {
    /// Launch this binary on first use.
    Launch(PathBuf),
    /// Attach to a running browser at this WebSocket URL.
    Connect(String),
}

// ============================================================================
// ConverterConfig
// ============================================================================

/// Validated converter configuration.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Browser to launch or attach to.
    pub browser: BrowserSource,
    /// Launch flags.
    pub options: ChromiumOptions,
    /// Time allowed for the browser to start.
    pub startup_timeout: Duration,
    /// Connection tunables.
    pub connection: ConnectionConfig,
    /// Deadline of a conversion that sets none.
    pub default_timeout: Duration,
    /// When a page counts as settled.
    pub idle_policy: IdlePolicy,
    /// PDF payload transfer mode.
    pub transfer: PayloadTransfer,
    /// Grace window before the browser is killed.
    pub shutdown_grace: Duration,
    /// Interval between `window.status` polls.
    pub status_poll_interval: Duration,
    /// Identifier carried by every conversion span.
    pub instance_id: Option<String>,
}

// ============================================================================
// ConverterBuilder
// ============================================================================

/// Builder for configuring a [`Converter`] instance.
///
/// Use [`Converter::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ConverterBuilder {
    binary: Option<PathBuf>,
    endpoint: Option<String>,
    options: ChromiumOptions,
    startup_timeout: Duration,
    connection: ConnectionConfig,
    default_timeout: Duration,
    idle_policy: IdlePolicy,
    transfer: PayloadTransfer,
    shutdown_grace: Duration,
    status_poll_interval: Duration,
    instance_id: Option<String>,
}

impl Default for ConverterBuilder {
    fn default() -> Self {
        Self {
            binary: None,
            endpoint: None,
            options: ChromiumOptions::new(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            connection: ConnectionConfig::default(),
            default_timeout: DEFAULT_CONVERSION_TIMEOUT,
            idle_policy: IdlePolicy::default(),
            transfer: PayloadTransfer::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            instance_id: None,
        }
    }
}

// ============================================================================
// ConverterBuilder Implementation
// ============================================================================

impl ConverterBuilder {
    /// Creates a new builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path to the Chromium binary.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the binary (e.g., "/usr/bin/chromium")
    #[inline]
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Attaches to a running browser instead of launching one.
    ///
    /// # Arguments
    ///
    /// * `url` - Browser WebSocket URL (`ws://host:port/devtools/browser/...`)
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Sets the launch flags.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ChromiumOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets how long the browser may take to start.
    #[inline]
    #[must_use]
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Sets the upper bound for a single protocol call.
    #[inline]
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.connection.call_timeout = timeout;
        self
    }

    /// Sets the deadline for conversions that set none.
    #[inline]
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the readiness policy.
    #[inline]
    #[must_use]
    pub fn idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.idle_policy = policy;
        self
    }

    /// Sets the quiescence window of the readiness policy.
    #[inline]
    #[must_use]
    pub fn quiet_window(mut self, window: Duration) -> Self {
        self.idle_policy = self.idle_policy.with_quiet_window(window);
        self
    }

    /// Treats a page as settled this long after `load`, even if requests
    /// are still pending.
    #[inline]
    #[must_use]
    pub fn idle_fallback(mut self, after: Duration) -> Self {
        self.idle_policy = self.idle_policy.with_fallback(after);
        self
    }

    /// Sets the PDF payload transfer mode.
    #[inline]
    #[must_use]
    pub fn transfer(mut self, transfer: PayloadTransfer) -> Self {
        self.transfer = transfer;
        self
    }

    /// Sets how long the browser gets to exit before it is killed.
    #[inline]
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the ceiling on calls in flight.
    #[inline]
    #[must_use]
    pub fn max_pending_calls(mut self, max: usize) -> Self {
        self.connection.max_pending_calls = max;
        self
    }

    /// Sets the per-subscriber event queue capacity.
    #[inline]
    #[must_use]
    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.connection.event_queue_capacity = capacity;
        self
    }

    /// Sets the `window.status` poll interval.
    #[inline]
    #[must_use]
    pub fn status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval = interval;
        self
    }

    /// Sets the identifier recorded on every conversion span.
    #[inline]
    #[must_use]
    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Builds the converter with validation. No browser is started yet.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if neither or both of binary and endpoint are set,
    ///   or a value is out of range
    /// - [`Error::BrowserNotFound`] if the binary path doesn't exist
    pub fn build(self) -> Result<Converter> {
        Ok(Converter::new(self.validate()?))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConverterBuilder {
    /// Checks every setting and produces the validated configuration.
    fn validate(self) -> Result<ConverterConfig> {
        let browser = self.validate_browser()?;

        self.options.validate().map_err(Error::config)?;

        for (name, value) in [
            ("startup_timeout", self.startup_timeout),
            ("call_timeout", self.connection.call_timeout),
            ("default_timeout", self.default_timeout),
            ("status_poll_interval", self.status_poll_interval),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }
        if self.connection.max_pending_calls == 0 {
            return Err(Error::config("max_pending_calls must be greater than zero"));
        }
        if self.connection.event_queue_capacity == 0 {
            return Err(Error::config("event_queue_capacity must be greater than zero"));
        }
        if let PayloadTransfer::Stream {
            chunk_size: Some(0),
        } = self.transfer
        {
            return Err(Error::config("stream chunk size must be greater than zero"));
        }

        Ok(ConverterConfig {
            browser,
            options: self.options,
            startup_timeout: self.startup_timeout,
            connection: self.connection,
            default_timeout: self.default_timeout,
            idle_policy: self.idle_policy,
            transfer: self.transfer,
            shutdown_grace: self.shutdown_grace,
            status_poll_interval: self.status_poll_interval,
            instance_id: self.instance_id,
        })
    }

    /// Validates the binary / endpoint configuration.
    fn validate_browser(&self) -> Result<BrowserSource> {
        match (&self.binary, &self.endpoint) {
            (Some(_), Some(_)) => Err(Error::config(
                "Set either .binary() or .endpoint(), not both",
            )),
            (None, None) => Err(Error::config(
                "A browser is required. Use .binary() to launch one or .endpoint() to attach.\n\
                 Example: Converter::builder().binary(\"/usr/bin/chromium\")",
            )),
            (Some(binary), None) => {
                if !binary.exists() {
                    return Err(Error::browser_not_found(binary));
                }
                Ok(BrowserSource::Launch(binary.clone()))
            }
            (None, Some(endpoint)) => {
                let url = Url::parse(endpoint)
                    .map_err(|e| Error::config(format!("Invalid endpoint {endpoint}: {e}")))?;
                if !matches!(url.scheme(), "ws" | "wss") {
                    return Err(Error::config(format!(
                        "Endpoint must be a ws:// or wss:// URL, got {endpoint}"
                    )));
                }
                Ok(BrowserSource::Connect(endpoint.clone()))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let builder = ConverterBuilder::new();
        assert!(builder.binary.is_none());
        assert!(builder.endpoint.is_none());
        assert_eq!(builder.default_timeout, DEFAULT_CONVERSION_TIMEOUT);
        assert_eq!(builder.transfer, PayloadTransfer::Stream { chunk_size: None });
        assert_eq!(builder.idle_policy, IdlePolicy::default());
    }

    #[test]
    fn test_build_fails_without_browser() {
        let err = ConverterBuilder::new().build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("binary"));
    }

    #[test]
    fn test_build_fails_with_both() {
        let err = ConverterBuilder::new()
            .binary("/bin/sh")
            .endpoint("ws://127.0.0.1:9222/devtools/browser/x")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_build_fails_with_nonexistent_binary() {
        let err = ConverterBuilder::new()
            .binary("/nonexistent/chromium")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::BrowserNotFound { .. }));
    }

    #[test]
    fn test_endpoint_scheme_is_checked() {
        let err = ConverterBuilder::new()
            .endpoint("http://127.0.0.1:9222/json/version")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        assert!(
            ConverterBuilder::new()
                .endpoint("not a url")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_zero_durations_rejected() {
        let endpoint = "ws://127.0.0.1:9222/devtools/browser/x";
        assert!(
            ConverterBuilder::new()
                .endpoint(endpoint)
                .call_timeout(Duration::ZERO)
                .build()
                .is_err()
        );
        assert!(
            ConverterBuilder::new()
                .endpoint(endpoint)
                .default_timeout(Duration::ZERO)
                .build()
                .is_err()
        );
        assert!(
            ConverterBuilder::new()
                .endpoint(endpoint)
                .max_pending_calls(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_invalid_options_rejected() {
        let err = ConverterBuilder::new()
            .endpoint("ws://127.0.0.1:9222/devtools/browser/x")
            .options(ChromiumOptions::new().with_window_size(0, 0))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_validated_config() {
        let config = ConverterBuilder::new()
            .endpoint("ws://127.0.0.1:9222/devtools/browser/x")
            .quiet_window(Duration::from_millis(250))
            .idle_fallback(Duration::from_secs(3))
            .call_timeout(Duration::from_secs(7))
            .instance_id("worker-1")
            .validate()
            .expect("valid");

        assert_eq!(
            config.browser,
            BrowserSource::Connect("ws://127.0.0.1:9222/devtools/browser/x".into())
        );
        assert_eq!(config.idle_policy.quiet_window, Duration::from_millis(250));
        assert_eq!(config.idle_policy.fallback, Some(Duration::from_secs(3)));
        assert_eq!(config.connection.call_timeout, Duration::from_secs(7));
        assert_eq!(config.instance_id.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = ConverterBuilder::new().binary("/usr/bin/chromium");
        let cloned = builder.clone();
        assert_eq!(builder.binary, cloned.binary);
    }
}
