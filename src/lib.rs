//! Chromium HTML to PDF - Convert HTML and URLs with headless Chromium.
//!
//! This library drives a Chromium browser over the DevTools protocol to
//! render HTML documents and URLs to PDF or images.
//!
//! # Architecture
//!
//! - **Transport**: one WebSocket per browser with a background receive
//!   loop, correlating responses to calls by id and fanning events out to
//!   subscriptions
//! - **Page**: one target attached in flattened mode, with a readiness state
//!   machine fed by lifecycle and network events
//! - **Converter**: launches or attaches to a browser, drives a page to
//!   network idle within a deadline, then prints or captures it
//!
//! Every call and wait is bounded by the conversion's [`Deadline`], and
//! every error carries an [`ErrorKind`].
//!
//! # Quick Start
//!
//! ```no_run
//! use chromium_html_to_pdf::{ConversionRequest, Converter, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let converter = Converter::builder()
//!         .binary("/usr/bin/chromium")
//!         .build()?;
//!
//!     let pdf = converter
//!         .convert(ConversionRequest::html("<h1>Hello</h1>"))
//!         .await?;
//!     println!("{} bytes in {:?}", pdf.byte_size, pdf.elapsed);
//!
//!     converter.close().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | [`Browser`] handle and [`Page`] sessions |
//! | [`converter`] | [`Converter`], configuration and process supervision |
//! | [`deadline`] | Overarching deadline propagation |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | DevTools message types |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Browser entities: Browser, Page.
pub mod browser;

/// Conversion orchestrator and browser launch configuration.
///
/// Use [`Converter::builder()`] to create a configured converter.
pub mod converter;

/// Deadlines passed down to every call and wait.
pub mod deadline;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
pub mod identifiers;

/// DevTools protocol message types.
pub mod protocol;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{
    Browser, IdlePolicy, ImageFormat, ImageOptions, MediaType, OutputFormat, Page, PageState,
    PageSettings, PayloadTransfer, PdfOptions, Viewport,
};

// Converter types
pub use converter::{
    BrowserProcess, ChromiumOptions, ConversionRequest, ConversionResult, Converter,
    ConverterBuilder, Source,
};

// Deadline
pub use deadline::Deadline;

// Error types
pub use error::{Error, ErrorKind, Result};

// Identifier types
pub use identifiers::{CallId, SessionId, StreamHandle, SubscriptionId, TargetId};

// Transport types
pub use transport::{Connection, ConnectionConfig, EventFilter, Subscription};
