//! Conversion entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Converter`] | Orchestrates conversions on a shared browser |
//! | [`ConverterBuilder`] | Fluent configuration builder |
//! | [`ChromiumOptions`] | Browser launch options |
//! | [`BrowserProcess`] | Supervised browser process |
//! | [`ConversionRequest`] | Source, output format and page hooks |
//!
//! # Example
//!
//! ```no_run
//! use chromium_html_to_pdf::{ConversionRequest, Converter, PdfOptions, Result};
//!
//! # async fn example() -> Result<()> {
//! let converter = Converter::builder()
//!     .binary("/usr/bin/chromium")
//!     .build()?;
//!
//! let request = ConversionRequest::url("https://example.com")
//!     .with_pdf(PdfOptions::default().with_print_background(true));
//! converter.convert_to_file(request, "example.pdf").await?;
//!
//! converter.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for converter configuration.
pub mod builder;

/// Conversion orchestrator.
pub mod core;

/// Chromium launch options.
pub mod options;

/// Browser process supervision.
pub mod process;

/// Conversion requests and results.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{
    BrowserSource, ConverterBuilder, ConverterConfig, DEFAULT_CONVERSION_TIMEOUT,
    DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_TIMEOUT, DEFAULT_STATUS_POLL_INTERVAL,
};
pub use self::core::Converter;
pub use options::ChromiumOptions;
pub use process::BrowserProcess;
pub use request::{ConversionRequest, ConversionResult, Source};
