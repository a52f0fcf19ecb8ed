//! Browser instance management.
//!
//! Each [`Browser`] owns:
//! - One browser-level WebSocket connection
//! - Optionally one supervised Chromium process (absent when attached to an
//!   existing browser)
//!
//! Pages are opened on demand and multiplexed over the single connection.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use chromium_html_to_pdf::{Browser, ChromiumOptions, ConnectionConfig, Deadline};
//!
//! # async fn example() -> chromium_html_to_pdf::Result<()> {
//! let browser = Browser::launch(
//!     "/usr/bin/chromium".as_ref(),
//!     &ChromiumOptions::new(),
//!     Duration::from_secs(10),
//!     ConnectionConfig::default(),
//! )
//! .await?;
//!
//! let page = browser.new_page(&Deadline::after(Duration::from_secs(5))).await?;
//! page.close().await;
//!
//! browser.close(Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::converter::{BrowserProcess, ChromiumOptions};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::protocol::request::required_str;
use crate::protocol::{BrowserCommand, Command};
use crate::transport::{Connection, ConnectionConfig};

use super::page::Page;

/// Timeout for the best-effort `Browser.close` request.
const CLOSE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a browser.
pub(crate) struct BrowserInner {
    /// Unique identifier for this browser.
    pub uuid: Uuid,
    /// Browser-level connection.
    pub connection: Connection,
    /// Supervised process; `None` when attached to an external browser.
    process: Mutex<Option<BrowserProcess>>,
    /// Process ID for logging, 0 when attached.
    pid: u32,
}

// ============================================================================
// Browser
// ============================================================================

/// A connected browser.
///
/// Cheap to clone; clones share the same connection and process.
#[derive(Clone)]
pub struct Browser {
    pub(crate) inner: Arc<BrowserInner>,
}

impl fmt::Debug for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Browser")
            .field("uuid", &self.inner.uuid)
            .field("endpoint", &self.inner.connection.endpoint())
            .field("pid", &self.inner.pid)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Browser - Constructors
// ============================================================================

impl Browser {
    /// Launches a browser process and connects to it.
    ///
    /// The process is shut down again if the connection cannot be opened.
    ///
    /// # Errors
    ///
    /// Returns any launch error, or the connection error.
    pub async fn launch(
        binary: &Path,
        options: &ChromiumOptions,
        startup_timeout: Duration,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let mut process = BrowserProcess::launch(binary, options, startup_timeout).await?;

        let connection = match Connection::open(process.endpoint(), config).await {
            Ok(connection) => connection,
            Err(e) => {
                if let Err(shutdown) = process.shutdown(Duration::ZERO).await {
                    debug!(error = %shutdown, "Shutdown after failed connect failed");
                }
                return Err(e);
            }
        };

        let pid = process.pid();
        Ok(Self::from_parts(connection, Some(process), pid))
    }

    /// Connects to an already running browser.
    ///
    /// [`close`](Self::close) disconnects but leaves the browser running.
    ///
    /// # Errors
    ///
    /// Returns the connection error.
    pub async fn connect(endpoint: &str, config: ConnectionConfig) -> Result<Self> {
        let connection = Connection::open(endpoint, config).await?;
        Ok(Self::from_parts(connection, None, 0))
    }

    fn from_parts(connection: Connection, process: Option<BrowserProcess>, pid: u32) -> Self {
        let uuid = Uuid::new_v4();
        info!(%uuid, endpoint = connection.endpoint(), pid, "Browser connected");
        Self {
            inner: Arc::new(BrowserInner {
                uuid,
                connection,
                process: Mutex::new(process),
                pid,
            }),
        }
    }
}

// ============================================================================
// Browser - Accessors
// ============================================================================

impl Browser {
    /// Returns the unique UUID of this browser handle.
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> &Uuid {
        &self.inner.uuid
    }

    /// Returns the browser process ID, or 0 when attached.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    /// Returns the debugging endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.inner.connection.endpoint()
    }

    /// Returns the browser-level connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }
}

// ============================================================================
// Browser - Operations
// ============================================================================

impl Browser {
    /// Opens a new blank page.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error.
    pub async fn new_page(&self, deadline: &Deadline) -> Result<Page> {
        Page::attach(
            &self.inner.connection,
            self.inner.connection.config().call_timeout,
            deadline,
        )
        .await
    }

    /// Returns the browser's product string, e.g. `HeadlessChrome/120.0.0.0`.
    ///
    /// # Errors
    ///
    /// Returns the call error, or [`Error::UnexpectedResponse`] if the
    /// result has no `product`.
    pub async fn version(&self) -> Result<String> {
        let result = self
            .inner
            .connection
            .send(Command::Browser(BrowserCommand::GetVersion), None, None)
            .await?;
        required_str(&result, "Browser.getVersion", "product").map(str::to_string)
    }

    /// Fails if the connection is closed or the process has exited.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is gone
    /// - [`Error::ProcessExited`] if the process has exited
    pub async fn ensure_alive(&self) -> Result<()> {
        if self.inner.connection.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if let Some(process) = self.inner.process.lock().await.as_mut() {
            process.ensure_alive()?;
        }
        Ok(())
    }

    /// Closes the browser.
    ///
    /// Asks the browser to exit via `Browser.close` (launched browsers only),
    /// closes the connection, then gives the process `grace` to exit before
    /// killing it. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownFailed`] if the process survives the kill.
    pub async fn close(&self, grace: Duration) -> Result<()> {
        let mut process = self.inner.process.lock().await;

        if process.is_some() && !self.inner.connection.is_closed() {
            let result = self
                .inner
                .connection
                .send(
                    Command::Browser(BrowserCommand::Close),
                    None,
                    Some(CLOSE_REQUEST_TIMEOUT),
                )
                .await;
            if let Err(e) = result {
                debug!(error = %e, "Browser.close failed");
            }
        }

        self.inner.connection.close().await;

        if let Some(process) = process.as_mut() {
            process.shutdown(grace).await?;
        }
        *process = None;

        info!(uuid = %self.inner.uuid, "Browser closed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::mock::{MockBrowser, ScriptedPage};

    #[test]
    fn test_browser_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Browser>();
    }

    #[test]
    fn test_browser_is_debug() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<Browser>();
    }

    #[tokio::test]
    async fn test_connect_version_and_page() {
        let mock = MockBrowser::start(ScriptedPage::default().into_responder()).await;
        let browser = Browser::connect(&mock.ws_url(), ConnectionConfig::default())
            .await
            .expect("connect");

        assert_eq!(browser.pid(), 0);
        assert_eq!(browser.version().await.expect("version"), "HeadlessChrome/120.0.0.0");
        browser.ensure_alive().await.expect("alive");

        let page = browser
            .new_page(&Deadline::after(Duration::from_secs(5)))
            .await
            .expect("page");
        assert_eq!(page.target_id().as_str(), "T1");
        page.close().await;

        browser.close(Duration::from_secs(1)).await.expect("close");
        assert!(browser.ensure_alive().await.is_err());
        browser.close(Duration::from_secs(1)).await.expect("idempotent");
        assert!(!mock.methods().iter().any(|m| m == "Browser.close"));
    }

    #[tokio::test]
    async fn test_dead_connection_is_detected() {
        let mock = MockBrowser::start(ScriptedPage::default().into_responder()).await;
        let browser = Browser::connect(&mock.ws_url(), ConnectionConfig::default())
            .await
            .expect("connect");

        mock.close();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !browser.connection().is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection notices closure");

        assert!(matches!(
            browser.ensure_alive().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_asks_browser_to_close_then_stops_process() {
        use crate::converter::process::fake;

        let mock = MockBrowser::start(ScriptedPage::default().into_responder()).await;
        let dir = tempfile::TempDir::new().expect("tempdir");
        let binary = fake::announcing(&dir, &mock.ws_url());

        let browser = Browser::launch(
            &binary,
            &ChromiumOptions::new(),
            Duration::from_secs(5),
            ConnectionConfig::default(),
        )
        .await
        .expect("launch");
        assert!(browser.pid() > 0);
        browser.ensure_alive().await.expect("alive");

        browser
            .close(Duration::from_millis(100))
            .await
            .expect("close");
        assert!(mock.methods().iter().any(|m| m == "Browser.close"));
        assert!(browser.ensure_alive().await.is_err());
    }
}
