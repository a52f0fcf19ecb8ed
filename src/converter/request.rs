//! Conversion requests and results.

use std::time::Duration;

use crate::browser::page::{ImageOptions, OutputFormat, PageSettings, PdfOptions};

// ============================================================================
// Source
// ============================================================================

/// What to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Navigate to a URL (`https://`, `file://`, `data:` ...).
    Url(String),
    /// Render an HTML document; it is written to a temporary file first.
    Html(String),
}

impl Source {
    /// Short description for logs, without the document body.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Html(html) => format!("<inline html, {} bytes>", html.len()),
        }
    }
}

// ============================================================================
// ConversionRequest
// ============================================================================

/// One conversion: a source, an output format and optional page hooks.
///
/// # Example
///
/// ```ignore
/// let request = ConversionRequest::html("<h1>Invoice</h1>")
///     .with_pdf(PdfOptions::default().with_print_background(true))
///     .with_timeout(Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// Document to render.
    pub source: Source,
    /// Output format and rendering options.
    pub format: OutputFormat,
    /// Settings applied before navigation.
    pub page: PageSettings,
    /// Script evaluated once the page is ready.
    pub run_javascript: Option<String>,
    /// Wait for `window.status` to equal this value before converting.
    pub wait_for_window_status: Option<String>,
    /// Overall deadline; the converter default applies if `None`.
    pub timeout: Option<Duration>,
}

impl ConversionRequest {
    /// Request for a URL, producing a PDF with browser defaults.
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(Source::Url(url.into()))
    }

    /// Request for an HTML document, producing a PDF with browser defaults.
    #[must_use]
    pub fn html(html: impl Into<String>) -> Self {
        Self::new(Source::Html(html.into()))
    }

    fn new(source: Source) -> Self {
        Self {
            source,
            format: OutputFormat::default(),
            page: PageSettings::default(),
            run_javascript: None,
            wait_for_window_status: None,
            timeout: None,
        }
    }

    /// Produces a PDF with `options`.
    #[must_use]
    pub fn with_pdf(mut self, options: PdfOptions) -> Self {
        self.format = OutputFormat::Pdf(options);
        self
    }

    /// Produces an image with `options`.
    #[must_use]
    pub fn with_image(mut self, options: ImageOptions) -> Self {
        self.format = OutputFormat::Image(options);
        self
    }

    /// Applies page settings before navigation.
    #[must_use]
    pub fn with_page_settings(mut self, settings: PageSettings) -> Self {
        self.page = settings;
        self
    }

    /// Runs `script` after the page is ready.
    #[must_use]
    pub fn with_javascript(mut self, script: impl Into<String>) -> Self {
        self.run_javascript = Some(script.into());
        self
    }

    /// Waits for `window.status` to equal `status`.
    #[must_use]
    pub fn with_window_status(mut self, status: impl Into<String>) -> Self {
        self.wait_for_window_status = Some(status.into());
        self
    }

    /// Overrides the overall deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ============================================================================
// ConversionResult
// ============================================================================

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult<T> {
    /// Produced payload, or whatever the sink hands back.
    pub output: T,
    /// Bytes written.
    pub byte_size: u64,
    /// Wall time of the conversion.
    pub elapsed: Duration,
}

impl<T> ConversionResult<T> {
    /// Replaces the output, keeping the measurements.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ConversionResult<U> {
        ConversionResult {
            output: f(self.output),
            byte_size: self.byte_size,
            elapsed: self.elapsed,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
