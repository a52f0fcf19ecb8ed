//! Chromium command-line options.
//!
//! Provides a type-safe interface for configuring how the browser process
//! is launched: headless mode, window size, sandboxing, proxy, and any
//! additional command-line arguments.
//!
//! # Example
//!
//! ```ignore
//! use chromium_html_to_pdf::ChromiumOptions;
//!
//! let options = ChromiumOptions::new()
//!     .with_window_size(1280, 800)
//!     .with_no_sandbox();
//!
//! let args = options.to_args(std::path::Path::new("/tmp/profile"));
//! ```

use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

/// Flags passed on every launch, regardless of options.
const BASE_ARGS: [&str; 5] = [
    "--no-first-run",
    "--no-default-browser-check",
    "--hide-scrollbars",
    "--mute-audio",
    "--disable-background-networking",
];

// ============================================================================
// ChromiumOptions
// ============================================================================

/// Chromium process configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromiumOptions {
    /// Run without a display.
    pub headless: bool,

    /// Window dimensions in pixels (width, height).
    pub window_size: Option<(u32, u32)>,

    /// Pass `--disable-gpu`.
    pub disable_gpu: bool,

    /// Pass `--no-sandbox` (needed when running as root in containers).
    pub no_sandbox: bool,

    /// Accept invalid TLS certificates.
    pub ignore_certificate_errors: bool,

    /// Proxy server, e.g. `http://127.0.0.1:3128`.
    pub proxy_server: Option<String>,

    /// Fixed debugging port; `None` lets the browser pick one.
    pub remote_debugging_port: Option<u16>,

    /// Persistent profile directory; `None` uses a temporary one.
    pub user_data_dir: Option<PathBuf>,

    /// Additional custom command-line arguments.
    pub extra_args: Vec<String>,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChromiumOptions {
    /// Creates headless options with GPU disabled.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            headless: true,
            window_size: None,
            disable_gpu: true,
            no_sandbox: false,
            ignore_certificate_errors: false,
            proxy_server: None,
            remote_debugging_port: None,
            user_data_dir: None,
            extra_args: Vec::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChromiumOptions {
    /// Runs the browser with a visible window.
    #[inline]
    #[must_use]
    pub fn with_headed(mut self) -> Self {
        self.headless = false;
        self
    }

    /// Sets window size in pixels.
    #[inline]
    #[must_use]
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }

    /// Keeps GPU acceleration enabled.
    #[inline]
    #[must_use]
    pub fn with_gpu(mut self) -> Self {
        self.disable_gpu = false;
        self
    }

    /// Disables the sandbox.
    #[inline]
    #[must_use]
    pub fn with_no_sandbox(mut self) -> Self {
        self.no_sandbox = true;
        self
    }

    /// Ignores certificate errors.
    #[inline]
    #[must_use]
    pub fn with_ignore_certificate_errors(mut self) -> Self {
        self.ignore_certificate_errors = true;
        self
    }

    /// Routes traffic through a proxy server.
    #[inline]
    #[must_use]
    pub fn with_proxy_server(mut self, server: impl Into<String>) -> Self {
        self.proxy_server = Some(server.into());
        self
    }

    /// Uses a fixed debugging port.
    #[inline]
    #[must_use]
    pub fn with_remote_debugging_port(mut self, port: u16) -> Self {
        self.remote_debugging_port = Some(port);
        self
    }

    /// Uses a persistent profile directory.
    #[inline]
    #[must_use]
    pub fn with_user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    /// Adds a custom command-line argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Adds multiple custom command-line arguments.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ChromiumOptions {
    /// Converts options to command-line arguments.
    ///
    /// `profile_dir` is used unless a persistent `user_data_dir` is set.
    /// The last argument is always `about:blank`.
    #[must_use]
    pub fn to_args(&self, profile_dir: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(BASE_ARGS.len() + 10 + self.extra_args.len());

        let port = self.remote_debugging_port.unwrap_or(0);
        args.push(format!("--remote-debugging-port={port}"));

        let data_dir = self.user_data_dir.as_deref().unwrap_or(profile_dir);
        args.push(format!("--user-data-dir={}", data_dir.display()));

        args.extend(BASE_ARGS.iter().map(|a| (*a).to_string()));

        if self.headless {
            args.push("--headless=new".to_string());
        }

        if self.disable_gpu {
            args.push("--disable-gpu".to_string());
        }

        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
        }

        if self.ignore_certificate_errors {
            args.push("--ignore-certificate-errors".to_string());
        }

        if let Some((width, height)) = self.window_size {
            args.push(format!("--window-size={width},{height}"));
        }

        if let Some(proxy) = &self.proxy_server {
            args.push(format!("--proxy-server={proxy}"));
        }

        args.extend(self.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }

    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if let Some((width, height)) = self.window_size
            && (width == 0 || height == 0)
        {
            return Err("Window dimensions must be greater than zero".to_string());
        }

        if let Some(proxy) = &self.proxy_server
            && proxy.trim().is_empty()
        {
            return Err("Proxy server must not be empty".to_string());
        }

        if self
            .extra_args
            .iter()
            .any(|a| a.starts_with("--remote-debugging-port") || a.starts_with("--user-data-dir"))
        {
            return Err(
                "Use with_remote_debugging_port / with_user_data_dir instead of raw flags"
                    .to_string(),
            );
        }
        Ok(())
    }

    /// Returns `true` if headless mode is enabled.
    #[inline]
    #[must_use]
    pub const fn is_headless(&self) -> bool {
        self.headless
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PathBuf {
        PathBuf::from("/tmp/profile")
    }

    #[test]
    fn test_new_is_headless() {
        let options = ChromiumOptions::new();
        assert!(options.is_headless());
        assert!(options.disable_gpu);
        assert!(options.window_size.is_none());
        assert!(options.extra_args.is_empty());
        assert_eq!(options, ChromiumOptions::default());
    }

    #[test]
    fn test_to_args_defaults() {
        let args = ChromiumOptions::new().to_args(&profile());

        assert_eq!(args[0], "--remote-debugging-port=0");
        assert_eq!(args[1], "--user-data-dir=/tmp/profile");
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-first-run".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_to_args_all_options() {
        let options = ChromiumOptions::new()
            .with_headed()
            .with_gpu()
            .with_window_size(1024, 768)
            .with_no_sandbox()
            .with_ignore_certificate_errors()
            .with_proxy_server("http://proxy:3128")
            .with_remote_debugging_port(9222)
            .with_user_data_dir("/var/profile")
            .with_arg("--lang=de");

        let args = options.to_args(&profile());
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
        assert!(args.contains(&"--user-data-dir=/var/profile".to_string()));
        assert!(args.contains(&"--window-size=1024,768".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
        assert!(args.contains(&"--proxy-server=http://proxy:3128".to_string()));
        assert!(args.contains(&"--lang=de".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.contains(&"--disable-gpu".to_string()));
    }

    #[test]
    fn test_with_args_multiple() {
        let options = ChromiumOptions::new().with_args(["--arg1", "--arg2"]);
        assert_eq!(options.extra_args.len(), 2);
    }

    #[test]
    fn test_validate_valid() {
        let options = ChromiumOptions::new().with_window_size(800, 600);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_dimension() {
        assert!(ChromiumOptions::new().with_window_size(0, 600).validate().is_err());
        assert!(ChromiumOptions::new().with_window_size(800, 0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_managed_flags() {
        let options = ChromiumOptions::new().with_arg("--remote-debugging-port=9222");
        assert!(options.validate().is_err());
    }
}
