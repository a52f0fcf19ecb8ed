//! Page sessions.
//!
//! Each [`Page`] is one browser target attached in flattened mode: its
//! commands and events travel over the browser connection tagged with the
//! page's session id.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Page struct, attachment, accessors, close |
//! | `readiness` | Readiness state machine and idle policy |
//! | `navigation` | Navigation and readiness waiting |
//! | `settings` | Viewport, media, user agent, headers, URL blocking |
//! | `script` | JavaScript evaluation, `window.status` polling |
//! | `capture` | PDF printing, screenshots, stream reassembly |
//!
//! # Example
//!
//! ```ignore
//! let page = browser.new_page(&deadline).await?;
//! page.navigate("https://example.com", &deadline).await?;
//! page.wait_until_ready(&IdlePolicy::default(), &deadline).await?;
//!
//! let mut pdf = Vec::new();
//! page.capture(&OutputFormat::default(), PayloadTransfer::default(), &deadline, &mut pdf).await?;
//! page.close().await;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod capture;
mod core;
mod navigation;
mod readiness;
mod script;
mod settings;

// ============================================================================
// Re-exports
// ============================================================================

pub use capture::{ImageFormat, ImageOptions, OutputFormat, PayloadTransfer, PdfOptions};
pub use self::core::Page;
pub use readiness::{
    DEFAULT_QUIET_WINDOW, IdlePolicy, PageFailure, PageState, ReadinessTracker,
};
pub use settings::{MediaType, PageSettings, Viewport};
