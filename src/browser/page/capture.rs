//! PDF printing and screenshot capture.
//!
//! Payloads are written straight to an [`AsyncWrite`] sink. PDFs can be
//! returned inline as one base64 string or streamed through `IO.read`; the
//! stream handle is closed on every exit path.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::identifiers::StreamHandle;
use crate::protocol::request::required_str;
use crate::protocol::{Command, IoCommand, PageCommand};

use super::Page;
use super::readiness::{PageFailure, PageState};

// ============================================================================
// ImageFormat
// ============================================================================

/// Image format for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// PNG format (lossless, larger file size).
    #[default]
    Png,
    /// JPEG format with quality (0-100).
    Jpeg(u8),
    /// WebP format with quality (0-100).
    Webp(u8),
}

impl ImageFormat {
    /// Creates PNG format.
    #[inline]
    #[must_use]
    pub fn png() -> Self {
        Self::Png
    }

    /// Creates JPEG format with quality (0-100).
    #[inline]
    #[must_use]
    pub fn jpeg(quality: u8) -> Self {
        Self::Jpeg(quality.min(100))
    }

    /// Creates WebP format with quality (0-100).
    #[inline]
    #[must_use]
    pub fn webp(quality: u8) -> Self {
        Self::Webp(quality.min(100))
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg(_) => "image/jpeg",
            Self::Webp(_) => "image/webp",
        }
    }

    /// Returns the file extension for this format.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg(_) => "jpg",
            Self::Webp(_) => "webp",
        }
    }

    /// Returns the format string for the protocol.
    fn format_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg(_) => "jpeg",
            Self::Webp(_) => "webp",
        }
    }

    /// Returns the quality value for lossy formats.
    fn quality(&self) -> Option<u8> {
        match self {
            Self::Png => None,
            Self::Jpeg(q) | Self::Webp(q) => Some(*q),
        }
    }
}

// ============================================================================
// ImageOptions
// ============================================================================

/// Screenshot options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageOptions {
    /// Encoding.
    pub format: ImageFormat,
    /// Capture the whole document, not just the viewport.
    pub full_page: bool,
}

impl ImageOptions {
    /// Options for `format`, viewport only.
    #[must_use]
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            full_page: false,
        }
    }

    /// Captures beyond the viewport.
    #[must_use]
    pub fn with_full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }

    /// `Page.captureScreenshot` params.
    #[must_use]
    pub fn to_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("format".into(), self.format.format_str().into());
        if let Some(quality) = self.format.quality() {
            params.insert("quality".into(), quality.into());
        }
        params.insert("captureBeyondViewport".into(), self.full_page.into());
        params.insert("fromSurface".into(), true.into());
        Value::Object(params)
    }
}

// ============================================================================
// PdfOptions
// ============================================================================

/// `Page.printToPDF` options, forwarded verbatim.
///
/// Unset fields are omitted so the browser applies its defaults. `extra`
/// carries any parameter not modelled here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    /// Landscape orientation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    /// Render header and footer templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_header_footer: Option<bool>,
    /// Print background graphics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
    /// Scale factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Paper width in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_width: Option<f64>,
    /// Paper height in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_height: Option<f64>,
    /// Top margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<f64>,
    /// Bottom margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<f64>,
    /// Left margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<f64>,
    /// Right margin in inches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<f64>,
    /// Pages to print, e.g. `1-5, 8`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,
    /// Header HTML template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,
    /// Footer HTML template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_template: Option<String>,
    /// Prefer page size defined by CSS.
    #[serde(rename = "preferCSSPageSize", skip_serializing_if = "Option::is_none")]
    pub prefer_css_page_size: Option<bool>,
    /// Additional raw params.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PdfOptions {
    /// Landscape orientation.
    #[must_use]
    pub fn with_landscape(mut self, landscape: bool) -> Self {
        self.landscape = Some(landscape);
        self
    }

    /// Print background graphics.
    #[must_use]
    pub fn with_print_background(mut self, background: bool) -> Self {
        self.print_background = Some(background);
        self
    }

    /// Scale factor.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Paper size in inches.
    #[must_use]
    pub fn with_paper_size(mut self, width: f64, height: f64) -> Self {
        self.paper_width = Some(width);
        self.paper_height = Some(height);
        self
    }

    /// All four margins in inches.
    #[must_use]
    pub fn with_margins(mut self, top: f64, right: f64, bottom: f64, left: f64) -> Self {
        self.margin_top = Some(top);
        self.margin_right = Some(right);
        self.margin_bottom = Some(bottom);
        self.margin_left = Some(left);
        self
    }

    /// Header and footer templates; enables their display.
    #[must_use]
    pub fn with_header_footer(
        mut self,
        header: impl Into<String>,
        footer: impl Into<String>,
    ) -> Self {
        self.display_header_footer = Some(true);
        self.header_template = Some(header.into());
        self.footer_template = Some(footer.into());
        self
    }

    /// Page ranges.
    #[must_use]
    pub fn with_page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.page_ranges = Some(ranges.into());
        self
    }

    /// Adds a raw parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// `Page.printToPDF` params for the given transfer mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_params(&self, transfer: PayloadTransfer) -> Result<Value> {
        let mut params = serde_json::to_value(self)?;
        if let (PayloadTransfer::Stream { .. }, Some(object)) = (transfer, params.as_object_mut()) {
            object.insert("transferMode".into(), "ReturnAsStream".into());
        }
        Ok(params)
    }
}

// ============================================================================
// OutputFormat
// ============================================================================

/// What to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    /// PDF via `Page.printToPDF`.
    Pdf(PdfOptions),
    /// Image via `Page.captureScreenshot`.
    Image(ImageOptions),
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Pdf(PdfOptions::default())
    }
}

impl OutputFormat {
    /// Returns the MIME type of the output.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf(_) => "application/pdf",
            Self::Image(options) => options.format.mime_type(),
        }
    }

    /// Returns the file extension of the output.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf(_) => "pdf",
            Self::Image(options) => options.format.extension(),
        }
    }
}

// ============================================================================
// PayloadTransfer
// ============================================================================

/// How a PDF payload travels back from the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadTransfer {
    /// One base64 string in the `Page.printToPDF` result.
    Inline,
    /// `IO.read` chunks of at most `chunk_size` bytes (browser default if `None`).
    Stream {
        /// Maximum bytes per read.
        chunk_size: Option<u32>,
    },
}

impl Default for PayloadTransfer {
    fn default() -> Self {
        Self::Stream { chunk_size: None }
    }
}

// ============================================================================
// Page - Capture
// ============================================================================

impl Page {
    /// Prints or captures the page into `sink`, returning the bytes written.
    ///
    /// The page must be `NetworkIdle`; it moves to `Converting`.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the browser rejects the options
    /// - [`Error::UnexpectedResponse`] / [`Error::Base64`] for bad payloads
    /// - [`Error::Io`] if writing to the sink fails
    pub async fn capture<W>(
        &self,
        format: &OutputFormat,
        transfer: PayloadTransfer,
        deadline: &Deadline,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.ensure_open()?;
        {
            let mut tracker = self.inner.tracker.lock();
            if !tracker.begin_conversion() {
                let state = tracker.state();
                drop(tracker);
                if state == PageState::Failed {
                    return Err(self.failure_error());
                }
                return Err(Error::config(format!(
                    "page is {state}, not ready for conversion"
                )));
            }
        }

        let outcome = match format {
            OutputFormat::Pdf(options) => self.print_pdf(options, transfer, deadline, sink).await,
            OutputFormat::Image(options) => self.screenshot(options, deadline, sink).await,
        };
        if let Err(e) = &outcome {
            self.fail(PageFailure::Conversion(e.to_string()));
        }
        outcome
    }

    async fn print_pdf<W>(
        &self,
        options: &PdfOptions,
        transfer: PayloadTransfer,
        deadline: &Deadline,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        debug!(session_id = %self.inner.session_id, ?transfer, "Printing to PDF");

        let params = options.to_params(transfer)?;
        let result = self
            .send(Command::Page(PageCommand::PrintToPdf(params)), deadline)
            .await?;

        if let Some(handle) = result
            .get("stream")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            let handle = StreamHandle::from(handle);
            let chunk_size = match transfer {
                PayloadTransfer::Stream { chunk_size } => chunk_size,
                PayloadTransfer::Inline => None,
            };

            let outcome = self.read_stream(&handle, chunk_size, deadline, sink).await;
            self.send_cleanup(Command::Io(IoCommand::Close { handle })).await;
            return outcome;
        }

        let data = required_str(&result, "Page.printToPDF", "data")?;
        write_base64(data, sink).await
    }

    async fn screenshot<W>(
        &self,
        options: &ImageOptions,
        deadline: &Deadline,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        debug!(
            session_id = %self.inner.session_id,
            format = ?options.format,
            full_page = options.full_page,
            "Capturing screenshot"
        );

        let result = self
            .send(
                Command::Page(PageCommand::CaptureScreenshot(options.to_params())),
                deadline,
            )
            .await?;
        let data = required_str(&result, "Page.captureScreenshot", "data")?;
        write_base64(data, sink).await
    }

    /// Reads a stream to its end.
    async fn read_stream<W>(
        &self,
        handle: &StreamHandle,
        chunk_size: Option<u32>,
        deadline: &Deadline,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;
        let mut chunks = 0u32;

        loop {
            let result = self
                .send(
                    Command::Io(IoCommand::Read {
                        handle: handle.clone(),
                        size: chunk_size,
                    }),
                    deadline,
                )
                .await?;

            let data = result.get("data").and_then(|v| v.as_str()).unwrap_or("");
            let encoded = result
                .get("base64Encoded")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            total += if encoded {
                write_base64(data, sink).await?
            } else {
                sink.write_all(data.as_bytes()).await?;
                data.len() as u64
            };
            chunks += 1;
            trace!(%handle, chunks, total, "Stream chunk");

            let eof = result.get("eof").and_then(|v| v.as_bool()).ok_or_else(|| {
                Error::unexpected_response("IO.read", "missing `eof`")
            })?;
            if eof {
                debug!(%handle, chunks, bytes = total, "Stream complete");
                return Ok(total);
            }
        }
    }
}

/// Decodes a base64 payload into `sink`.
async fn write_base64<W>(data: &str, sink: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = Base64Standard.decode(data)?;
    sink.write_all(&bytes).await?;
    Ok(bytes.len() as u64)
}

// ============================================================================
// Tests
// ============================================================================
