//! Conversion orchestrator.
//!
//! A [`Converter`] keeps one browser for its whole life, launching it on
//! first use and relaunching it if it dies. Every conversion opens its own
//! page, drives it to readiness within the request deadline and writes the
//! payload into the caller's sink.
//!
//! # Example
//!
//! ```no_run
//! use chromium_html_to_pdf::{ConversionRequest, Converter, Result};
//!
//! # async fn example() -> Result<()> {
//! let converter = Converter::builder()
//!     .binary("/usr/bin/chromium")
//!     .build()?;
//!
//! let pdf = converter
//!     .convert(ConversionRequest::html("<h1>Hello</h1>"))
//!     .await?;
//! assert!(pdf.byte_size > 0);
//!
//! converter.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::browser::{Browser, Page, PageFailure};
use crate::deadline::{Deadline, millis};
use crate::error::{Error, Result};

use super::builder::{BrowserSource, ConverterBuilder, ConverterConfig};
use super::request::{ConversionRequest, ConversionResult, Source};

/// Prefix of temporary files written by the converter.
const TEMP_PREFIX: &str = "chromium-html-to-pdf-";

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a converter.
struct ConverterInner {
    /// Validated configuration.
    config: ConverterConfig,
    /// Identifier recorded on every conversion span.
    instance_id: String,
    /// Browser shared by all conversions, started lazily.
    browser: Mutex<Option<Browser>>,
}

// ============================================================================
// Converter
// ============================================================================

/// Converts HTML documents and URLs to PDF or images.
///
/// Cheap to clone; clones share the same browser. Conversions may run
/// concurrently, each on its own page.
#[derive(Clone)]
pub struct Converter {
    inner: Arc<ConverterInner>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("instance_id", &self.inner.instance_id)
            .field("browser", &self.inner.config.browser)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Converter - Constructors
// ============================================================================

impl Converter {
    /// Creates a configuration builder for the converter.
    #[inline]
    #[must_use]
    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::new()
    }

    /// Creates a converter from validated configuration.
    pub(crate) fn new(config: ConverterConfig) -> Self {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        debug!(instance_id = %instance_id, browser = ?config.browser, "Converter created");

        Self {
            inner: Arc::new(ConverterInner {
                config,
                instance_id,
                browser: Mutex::new(None),
            }),
        }
    }
}

// ============================================================================
// Converter - Accessors
// ============================================================================

impl Converter {
    /// Returns the identifier recorded on conversion spans.
    #[inline]
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    /// Returns the validated configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConverterConfig {
        &self.inner.config
    }

    /// Returns the browser's product string, starting the browser if needed.
    ///
    /// # Errors
    ///
    /// Returns any launch, connection or call error.
    pub async fn browser_version(&self) -> Result<String> {
        let deadline = Deadline::after(self.inner.config.default_timeout);
        self.browser(&deadline).await?.version().await
    }
}

// ============================================================================
// Converter - Conversion
// ============================================================================

impl Converter {
    /// Converts and returns the payload in memory.
    ///
    /// # Errors
    ///
    /// Returns exactly one classified error; see [`Converter::convert_into`].
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult<Vec<u8>>> {
        self.convert_into(request, Vec::new()).await
    }

    /// Converts into `sink`, which is flushed and shut down on success and
    /// handed back in the result.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the request deadline passes
    /// - [`Error::Protocol`] / [`Error::NavigationFailed`] if the browser
    ///   rejects a command or the navigation
    /// - transport, process and IO errors as they occur
    pub async fn convert_into<W>(
        &self,
        request: ConversionRequest,
        mut sink: W,
    ) -> Result<ConversionResult<W>>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let conversion_id = Uuid::new_v4();
        let span = info_span!(
            "conversion",
            instance_id = %self.inner.instance_id,
            %conversion_id
        );

        async move {
            let started = Instant::now();
            let timeout = request.timeout.unwrap_or(self.inner.config.default_timeout);
            let deadline = Deadline::after(timeout);

            info!(
                source = %request.source.describe(),
                mime_type = request.format.mime_type(),
                timeout_ms = millis(timeout),
                "Conversion started"
            );

            let byte_size = match self.run(&request, &deadline, &mut sink).await {
                Ok(byte_size) => byte_size,
                Err(e) => {
                    warn!(error = %e, kind = ?e.kind(), "Conversion failed");
                    return Err(e);
                }
            };

            sink.flush().await?;
            sink.shutdown().await?;

            let elapsed = started.elapsed();
            info!(
                byte_size,
                elapsed_ms = elapsed.as_millis() as u64,
                "Conversion finished"
            );
            Ok(ConversionResult {
                output: sink,
                byte_size,
                elapsed,
            })
        }
        .instrument(span)
        .await
    }

    /// Converts into the file at `path`.
    ///
    /// The payload goes to a temporary file in the same directory, which
    /// replaces `path` only once the conversion succeeded.
    ///
    /// # Errors
    ///
    /// As [`Converter::convert_into`], plus [`Error::Io`] if the file cannot
    /// be created or persisted.
    pub async fn convert_to_file(
        &self,
        request: ConversionRequest,
        path: impl AsRef<Path>,
    ) -> Result<ConversionResult<PathBuf>> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!(".{}", request.format.extension()))
            .tempfile_in(dir)?;
        let file = tokio::fs::File::from_std(temp.reopen()?);

        let result = self.convert_into(request, file).await?;
        drop(result.output);

        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        debug!(path = %path.display(), "Output persisted");

        Ok(ConversionResult {
            output: path.to_path_buf(),
            byte_size: result.byte_size,
            elapsed: result.elapsed,
        })
    }

    /// Closes the browser. Idempotent; a later conversion starts a new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownFailed`] if the process survives the kill.
    pub async fn close(&self) -> Result<()> {
        let browser = self.inner.browser.lock().await.take();
        if let Some(browser) = browser {
            browser.close(self.inner.config.shutdown_grace).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Converter - Internal
// ============================================================================

impl Converter {
    /// One conversion on a fresh page. The page is always closed.
    async fn run<W>(
        &self,
        request: &ConversionRequest,
        deadline: &Deadline,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        // Held until the conversion is over; removed on drop.
        let (url, _document) = prepare_source(&request.source).await?;

        let browser = self.browser(deadline).await?;

        let page = match browser.new_page(deadline).await {
            Ok(page) => page,
            Err(e) => {
                self.discard_if_fatal(&browser, &e).await;
                return Err(e);
            }
        };

        let outcome = self.drive(&page, &url, request, deadline, sink).await;
        if let Err(e) = &outcome {
            page.fail(PageFailure::Conversion(e.to_string()));
        }
        page.close().await;

        if let Err(e) = &outcome {
            self.discard_if_fatal(&browser, e).await;
        }
        outcome
    }

    /// Settings, navigation, readiness, hooks, capture.
    async fn drive<W>(
        &self,
        page: &Page,
        url: &str,
        request: &ConversionRequest,
        deadline: &Deadline,
        sink: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let config = &self.inner.config;

        page.apply_settings(&request.page, deadline).await?;
        page.navigate(url, deadline).await?;
        page.wait_until_ready(&config.idle_policy, deadline).await?;

        if let Some(script) = &request.run_javascript {
            page.evaluate(script, deadline).await?;
        }
        if let Some(status) = &request.wait_for_window_status {
            page.wait_for_window_status(status, config.status_poll_interval, deadline)
                .await?;
        }

        page.capture(&request.format, config.transfer, deadline, sink)
            .await
    }

    /// Returns the shared browser, starting or restarting it as needed.
    async fn browser(&self, deadline: &Deadline) -> Result<Browser> {
        let mut slot = self.inner.browser.lock().await;

        if let Some(browser) = slot.as_ref() {
            match browser.ensure_alive().await {
                Ok(()) => return Ok(browser.clone()),
                Err(e) => {
                    warn!(error = %e, "Browser is gone, starting a new one");
                    if let Some(dead) = slot.take() {
                        shutdown_quietly(&dead).await;
                    }
                }
            }
        }

        let config = &self.inner.config;
        let browser = match &config.browser {
            BrowserSource::Launch(binary) => {
                let startup_timeout = deadline.clamp(config.startup_timeout);
                if startup_timeout.is_zero() {
                    return Err(deadline.expired("launch browser"));
                }
                Browser::launch(binary, &config.options, startup_timeout, config.connection)
                    .await?
            }
            BrowserSource::Connect(endpoint) => {
                tokio::time::timeout(
                    deadline.remaining(),
                    Browser::connect(endpoint, config.connection),
                )
                .await
                .map_err(|_| deadline.expired("connect to browser"))??
            }
        };

        *slot = Some(browser.clone());
        Ok(browser)
    }

    /// Drops the shared browser if `error` leaves it unusable.
    async fn discard_if_fatal(&self, browser: &Browser, error: &Error) {
        if !error.is_fatal_to_browser() {
            return;
        }

        let discarded = {
            let mut slot = self.inner.browser.lock().await;
            let is_current = slot
                .as_ref()
                .is_some_and(|current| current.uuid() == browser.uuid());
            if is_current { slot.take() } else { None }
        };

        if let Some(browser) = discarded {
            warn!(uuid = %browser.uuid(), error = %error, "Discarding browser");
            shutdown_quietly(&browser).await;
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Closes a browser that is already considered lost.
async fn shutdown_quietly(browser: &Browser) {
    if let Err(e) = browser.close(Duration::ZERO).await {
        debug!(error = %e, "Shutdown of lost browser failed");
    }
}

/// Resolves a source to a URL. Inline HTML is written to a temporary file
/// that must outlive the navigation.
async fn prepare_source(source: &Source) -> Result<(String, Option<NamedTempFile>)> {
    match source {
        Source::Url(url) => Ok((url.clone(), None)),
        Source::Html(html) => {
            let file = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(".html")
                .tempfile()?;
            tokio::fs::write(file.path(), html).await?;

            let url = Url::from_file_path(file.path()).map_err(|()| {
                Error::config(format!(
                    "cannot build a file URL for {}",
                    file.path().display()
                ))
            })?;
            Ok((url.to_string(), Some(file)))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::browser::page::{ImageFormat, ImageOptions, PdfOptions};
    use crate::error::ErrorKind;
    use crate::transport::mock::{MockBrowser, ScriptedPage};

    fn converter_for(mock: &MockBrowser) -> Converter {
        Converter::builder()
            .endpoint(mock.ws_url())
            .quiet_window(Duration::from_millis(50))
            .status_poll_interval(Duration::from_millis(10))
            .instance_id("test")
            .build()
            .expect("build")
    }

    #[test]
    fn test_converter_is_clone_and_debug() {
        fn assert_clone<T: Clone>() {}
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_clone::<Converter>();
        assert_debug::<Converter>();
    }

    #[tokio::test]
    async fn test_static_html_to_pdf() {
        let script = ScriptedPage::default();
        let expected = script.pdf();
        let mock = MockBrowser::start(script.into_responder()).await;
        let converter = converter_for(&mock);

        let result = converter
            .convert(ConversionRequest::html("<h1>Invoice</h1>"))
            .await
            .expect("convert");

        assert_eq!(result.output, expected);
        assert_eq!(result.byte_size, expected.len() as u64);

        let requests = mock.requests();
        let navigate = requests
            .iter()
            .find(|r| r["method"] == "Page.navigate")
            .expect("navigated");
        let url = navigate["params"]["url"].as_str().expect("url");
        assert!(url.starts_with("file://") && url.ends_with(".html"));

        let methods = mock.methods();
        assert!(methods.iter().any(|m| m == "IO.close"));
        assert!(methods.iter().any(|m| m == "Target.closeTarget"));
        converter.close().await.expect("close");
    }

    #[tokio::test]
    async fn test_unbounded_timeout_converts() {
        let mock = MockBrowser::start(ScriptedPage::default().into_responder()).await;
        let converter = Converter::builder()
            .endpoint(mock.ws_url())
            .quiet_window(Duration::from_millis(50))
            .default_timeout(Duration::MAX)
            .build()
            .expect("build");

        converter
            .convert(ConversionRequest::url("https://example.com/"))
            .await
            .expect("default timeout");
        converter
            .convert(ConversionRequest::url("https://example.com/").with_timeout(Duration::MAX))
            .await
            .expect("request timeout");
    }

    #[tokio::test]
    async fn test_browser_is_reused() {
        let mock = MockBrowser::start(ScriptedPage::default().into_responder()).await;
        let converter = converter_for(&mock);

        for _ in 0..2 {
            converter
                .convert(ConversionRequest::url("https://example.com/"))
                .await
                .expect("convert");
        }
        assert_eq!(
            converter.browser_version().await.expect("version"),
            "HeadlessChrome/120.0.0.0"
        );
        let created = mock
            .methods()
            .iter()
            .filter(|m| *m == "Target.createTarget")
            .count();
        assert_eq!(created, 2);
    }

    #[tokio::test]
    async fn test_never_idle_page_times_out() {
        let script = ScriptedPage {
            hanging_request: true,
            ..ScriptedPage::default()
        };
        let mock = MockBrowser::start(script.into_responder()).await;
        let converter = converter_for(&mock);

        let started = Instant::now();
        let err = converter
            .convert(
                ConversionRequest::url("https://example.com/slow")
                    .with_timeout(Duration::from_millis(300)),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(3));
        let methods = mock.methods();
        assert!(methods.iter().any(|m| m == "Page.stopLoading"));
        assert!(methods.iter().any(|m| m == "Target.closeTarget"));
        assert!(!methods.iter().any(|m| m == "Page.printToPDF"));
    }

    #[tokio::test]
    async fn test_print_rejection_is_passed_through() {
        let script = ScriptedPage {
            print_error: Some((-32602, "Invalid parameters: paperWidth".into())),
            ..ScriptedPage::default()
        };
        let mock = MockBrowser::start(script.into_responder()).await;
        let converter = converter_for(&mock);

        let err = converter
            .convert(
                ConversionRequest::url("https://example.com/")
                    .with_pdf(PdfOptions::default().with_param("paperWidth", "wide")),
            )
            .await
            .unwrap_err();

        assert_eq!(err.protocol_code(), Some(-32602));
        match err {
            Error::Protocol { error, .. } => {
                assert_eq!(error.message, "Invalid parameters: paperWidth");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_image_output_and_hooks() {
        let script = ScriptedPage {
            window_status: "done".into(),
            ..ScriptedPage::default()
        };
        let expected = script.image.clone();
        let mock = MockBrowser::start(script.into_responder()).await;
        let converter = converter_for(&mock);

        let result = converter
            .convert(
                ConversionRequest::url("https://example.com/")
                    .with_image(ImageOptions::new(ImageFormat::Png).with_full_page(true))
                    .with_javascript("document.title = 'x'")
                    .with_window_status("done"),
            )
            .await
            .expect("convert");

        assert_eq!(result.output, expected);
        let methods = mock.methods();
        assert!(methods.iter().any(|m| m == "Page.captureScreenshot"));
        assert!(methods.iter().filter(|m| *m == "Runtime.evaluate").count() >= 2);
    }

    #[tokio::test]
    async fn test_convert_to_file() {
        let script = ScriptedPage::default();
        let expected = script.pdf();
        let mock = MockBrowser::start(script.into_responder()).await;
        let converter = converter_for(&mock);
        let dir = tempfile::TempDir::new().expect("tempdir");
        let target = dir.path().join("out.pdf");

        let result = converter
            .convert_to_file(ConversionRequest::html("<p>x</p>"), &target)
            .await
            .expect("convert");

        assert_eq!(result.output, target);
        assert_eq!(std::fs::read(&target).expect("read"), expected);
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 1);
    }

    #[tokio::test]
    async fn test_failed_conversion_leaves_no_file() {
        let script = ScriptedPage {
            print_error: Some((-32000, "Printing failed".into())),
            ..ScriptedPage::default()
        };
        let mock = MockBrowser::start(script.into_responder()).await;
        let converter = converter_for(&mock);
        let dir = tempfile::TempDir::new().expect("tempdir");
        let target = dir.path().join("out.pdf");

        let err = converter
            .convert_to_file(ConversionRequest::html("<p>x</p>"), &target)
            .await
            .unwrap_err();

        assert!(err.is_protocol_error());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 0);
    }

    #[tokio::test]
    async fn test_lost_browser_is_replaced() {
        let mock = MockBrowser::start(ScriptedPage::default().into_responder()).await;
        let converter = converter_for(&mock);

        converter
            .convert(ConversionRequest::url("https://example.com/"))
            .await
            .expect("convert");

        mock.close();
        let browser = converter.inner.browser.lock().await.clone().expect("browser");
        tokio::time::timeout(Duration::from_secs(2), async {
            while !browser.connection().is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection notices closure");

        // The mock serves a single client, so reconnecting fails.
        let err = converter
            .convert(ConversionRequest::url("https://example.com/"))
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
        assert!(converter.inner.browser.lock().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_then_supervisor_shuts_browser_down() {
        use crate::converter::process::fake;

        let script = ScriptedPage {
            hanging_request: true,
            ..ScriptedPage::default()
        };
        let mock = MockBrowser::start(script.into_responder()).await;
        let dir = tempfile::TempDir::new().expect("tempdir");
        let binary = fake::announcing(&dir, &mock.ws_url());

        let converter = Converter::builder()
            .binary(&binary)
            .quiet_window(Duration::from_millis(50))
            .shutdown_grace(Duration::from_millis(100))
            .build()
            .expect("build");

        let err = converter
            .convert(
                ConversionRequest::url("https://example.com/slow")
                    .with_timeout(Duration::from_millis(500)),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let browser = converter.inner.browser.lock().await.clone().expect("browser");
        assert!(browser.pid() > 0);

        converter.close().await.expect("shutdown");
        assert!(browser.ensure_alive().await.is_err());
        assert!(mock.methods().iter().any(|m| m == "Browser.close"));
        converter.close().await.expect("idempotent");
    }
}
