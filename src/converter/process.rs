//! Browser process supervision.
//!
//! A [`BrowserProcess`] owns:
//! - One Chromium child process
//! - One profile directory (temporary unless a persistent one is configured)
//! - The debugging endpoint the browser announced on stderr
//!
//! Dropping it kills the child, so no browser outlives its owner.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

use super::options::ChromiumOptions;

// ============================================================================
// Constants
// ============================================================================

/// How long to wait for the process to go away after the kill signal.
const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for an exit status once stderr reached EOF.
const EXIT_STATUS_TIMEOUT: Duration = Duration::from_secs(1);

/// Prefix of temporary profile directories.
const PROFILE_PREFIX: &str = "chromium-html-to-pdf-";

/// Line the browser prints once the debugging endpoint is up.
static ENDPOINT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"DevTools listening on (ws://\S+)").ok());

// ============================================================================
// BrowserProcess
// ============================================================================

/// A running browser process and its debugging endpoint.
pub struct BrowserProcess {
    /// The child process handle; `None` once shut down.
    child: Option<Child>,
    /// Process ID for logging.
    pid: u32,
    /// WebSocket URL of the browser target.
    endpoint: String,
    /// Temporary profile, removed on drop.
    profile: Option<TempDir>,
    /// Forwards the rest of stderr to the log.
    stderr_task: Option<JoinHandle<()>>,
}

impl fmt::Debug for BrowserProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserProcess")
            .field("pid", &self.pid)
            .field("endpoint", &self.endpoint)
            .field("running", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BrowserProcess - Launch
// ============================================================================

impl BrowserProcess {
    /// Starts the browser and waits for it to announce its endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessLaunchFailed`] if the binary cannot be spawned
    /// - [`Error::ProcessExited`] if the process exits before the endpoint
    ///   is announced
    /// - [`Error::Timeout`] if nothing is announced within `startup_timeout`
    pub async fn launch(
        binary: &Path,
        options: &ChromiumOptions,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let profile = match options.user_data_dir {
            Some(_) => None,
            None => Some(tempfile::Builder::new().prefix(PROFILE_PREFIX).tempdir()?),
        };
        let profile_dir = profile
            .as_ref()
            .map_or_else(|| Path::new(""), |dir| dir.path());
        let args = options.to_args(profile_dir);

        debug!(binary = %binary.display(), ?args, "Spawning browser");

        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::process_launch_failed(format!("{}: {e}", binary.display()))
            })?;

        let pid = child.id().unwrap_or(0);
        let stderr = child.stderr.take();

        let mut process = Self {
            child: Some(child),
            pid,
            endpoint: String::new(),
            profile,
            stderr_task: None,
        };

        let Some(stderr) = stderr else {
            process.kill().await;
            return Err(Error::process_launch_failed("stderr was not captured"));
        };
        let mut lines = BufReader::new(stderr).lines();

        let discovered =
            tokio::time::timeout(startup_timeout, discover_endpoint(&mut lines, pid)).await;

        match discovered {
            Ok(Ok(Some(endpoint))) => {
                process.endpoint = endpoint;
            }
            Ok(Ok(None)) => {
                let status = process.exit_status().await;
                process.kill().await;
                return Err(Error::process_exited(status));
            }
            Ok(Err(e)) => {
                process.kill().await;
                return Err(Error::Io(e));
            }
            Err(_) => {
                process.kill().await;
                return Err(Error::timeout(
                    "wait for DevTools endpoint",
                    startup_timeout.as_millis() as u64,
                ));
            }
        }

        process.stderr_task = Some(tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(pid, line = %line, "Browser stderr");
            }
        }));

        info!(pid, endpoint = %process.endpoint, "Browser launched");
        Ok(process)
    }
}

// ============================================================================
// BrowserProcess - Accessors
// ============================================================================

impl BrowserProcess {
    /// Returns the process ID.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the debugging WebSocket URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the temporary profile directory, if one is in use.
    #[inline]
    #[must_use]
    pub fn profile_dir(&self) -> Option<&Path> {
        self.profile.as_ref().map(TempDir::path)
    }

    /// Fails if the process has exited or was shut down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProcessExited`] with the exit status.
    pub fn ensure_alive(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Err(Error::process_exited("shut down"));
        };
        match child.try_wait()? {
            Some(status) => Err(Error::process_exited(status)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// BrowserProcess - Shutdown
// ============================================================================

impl BrowserProcess {
    /// Waits up to `grace` for the process to exit, then kills it.
    ///
    /// Idempotent: later calls return `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownFailed`] if the process survives the kill.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        self.stop_stderr_task();

        if let Ok(waited) = tokio::time::timeout(grace, child.wait()).await {
            match waited {
                Ok(status) => info!(pid = self.pid, %status, "Browser exited"),
                Err(e) => debug!(pid = self.pid, error = %e, "Failed to wait for browser"),
            }
            return Ok(());
        }

        warn!(
            pid = self.pid,
            grace_ms = grace.as_millis() as u64,
            "Browser still running after grace window, killing"
        );
        if let Err(e) = child.start_kill() {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal");
        }

        match tokio::time::timeout(KILL_TIMEOUT, child.wait()).await {
            Ok(_) => {
                info!(pid = self.pid, "Browser killed");
                Ok(())
            }
            Err(_) => Err(Error::ShutdownFailed {
                pid: self.pid,
                timeout_ms: KILL_TIMEOUT.as_millis() as u64,
            }),
        }
    }

    /// Kills the process without a grace window, ignoring failures.
    async fn kill(&mut self) {
        self.stop_stderr_task();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(pid = self.pid, error = %e, "Failed to send kill signal");
            }
            let _ = tokio::time::timeout(KILL_TIMEOUT, child.wait()).await;
        }
    }

    /// Best-effort exit status after stderr closed.
    async fn exit_status(&mut self) -> String {
        let Some(child) = self.child.as_mut() else {
            return "shut down".to_string();
        };
        match tokio::time::timeout(EXIT_STATUS_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "stderr closed before the endpoint was announced".to_string(),
        }
    }

    fn stop_stderr_task(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl Drop for BrowserProcess {
    fn drop(&mut self) {
        self.stop_stderr_task();
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// Endpoint Discovery
// ============================================================================

/// Reads lines until one announces the endpoint. `None` on EOF.
async fn discover_endpoint<R>(lines: &mut Lines<R>, pid: u32) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        trace!(pid, line = %line, "Browser stderr");
        if let Some(endpoint) = parse_endpoint(&line) {
            return Ok(Some(endpoint));
        }
    }
    Ok(None)
}

/// Extracts the WebSocket URL from a `DevTools listening on` line.
fn parse_endpoint(line: &str) -> Option<String> {
    ENDPOINT_PATTERN
        .as_ref()?
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// Test Support
// ============================================================================

/// Throwaway shell-script browsers for tests.
#[cfg(all(test, unix))]
pub(crate) mod fake {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    use tempfile::TempDir;

    /// Writes an executable shell script standing in for the browser.
    pub(crate) fn browser(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-chromium");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        path
    }

    /// Script that announces `endpoint` and then idles.
    pub(crate) fn announcing(dir: &TempDir, endpoint: &str) -> PathBuf {
        browser(
            dir,
            &format!("echo \"DevTools listening on {endpoint}\" >&2\nexec sleep 30"),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
