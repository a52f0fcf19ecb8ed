//! Browser entities module.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Browser`] | Browser-level connection, optionally owning the process |
//! | [`Page`] | One target attached in flattened mode |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use chromium_html_to_pdf::{Browser, ConnectionConfig, Deadline, IdlePolicy, Result};
//!
//! # async fn example() -> Result<()> {
//! let browser = Browser::connect(
//!     "ws://127.0.0.1:9222/devtools/browser/abc",
//!     ConnectionConfig::default(),
//! )
//! .await?;
//! let deadline = Deadline::after(Duration::from_secs(30));
//!
//! let page = browser.new_page(&deadline).await?;
//! page.navigate("https://example.com", &deadline).await?;
//! page.wait_until_ready(&IdlePolicy::default(), &deadline).await?;
//! page.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Browser handle.
pub mod instance;

/// Page sessions.
pub mod page;

// ============================================================================
// Re-exports
// ============================================================================

pub use instance::Browser;
pub use page::{
    DEFAULT_QUIET_WINDOW, IdlePolicy, ImageFormat, ImageOptions, MediaType, OutputFormat, Page,
    PageFailure, PageSettings, PageState, PayloadTransfer, PdfOptions, ReadinessTracker, Viewport,
};
