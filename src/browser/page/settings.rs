//! Per-page settings applied before navigation.

use serde_json::{Map, Value};
use tracing::debug;

use crate::deadline::Deadline;
use crate::error::Result;
use crate::protocol::{Command, EmulationCommand, NetworkCommand};

use super::Page;

// ============================================================================
// Types
// ============================================================================

/// CSS media type to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    /// `@media print` rules apply (browser default when printing).
    #[default]
    Print,
    /// `@media screen` rules apply.
    Screen,
}

impl MediaType {
    /// Protocol value.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Screen => "screen",
        }
    }
}

/// Viewport override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
    /// Device pixel ratio; 0 keeps the browser default.
    pub device_scale_factor: f64,
    /// Emulate a mobile device.
    pub mobile: bool,
}

impl Viewport {
    /// Desktop viewport of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: 0.0,
            mobile: false,
        }
    }
}

/// Settings applied to a page before it navigates.
///
/// Every field is optional; unset fields leave the browser default alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSettings {
    /// Viewport override.
    pub viewport: Option<Viewport>,
    /// Media type emulation.
    pub media: Option<MediaType>,
    /// User agent override.
    pub user_agent: Option<String>,
    /// Headers added to every request.
    pub extra_headers: Vec<(String, String)>,
    /// URL patterns to block (`*` wildcards).
    pub blocked_urls: Vec<String>,
}

impl PageSettings {
    /// Sets the viewport.
    #[must_use]
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Sets the emulated media type.
    #[must_use]
    pub fn with_media(mut self, media: MediaType) -> Self {
        self.media = Some(media);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Blocks requests matching `pattern`.
    #[must_use]
    pub fn with_blocked_url(mut self, pattern: impl Into<String>) -> Self {
        self.blocked_urls.push(pattern.into());
        self
    }

    /// Commands that apply these settings, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();

        if let Some(viewport) = self.viewport {
            commands.push(Command::Emulation(
                EmulationCommand::SetDeviceMetricsOverride {
                    width: viewport.width,
                    height: viewport.height,
                    device_scale_factor: viewport.device_scale_factor,
                    mobile: viewport.mobile,
                },
            ));
        }

        if let Some(media) = self.media {
            commands.push(Command::Emulation(EmulationCommand::SetEmulatedMedia {
                media: media.as_str().to_string(),
            }));
        }

        if let Some(user_agent) = &self.user_agent {
            commands.push(Command::Network(NetworkCommand::SetUserAgentOverride {
                user_agent: user_agent.clone(),
            }));
        }

        if !self.extra_headers.is_empty() {
            let headers: Map<String, Value> = self
                .extra_headers
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect();
            commands.push(Command::Network(NetworkCommand::SetExtraHttpHeaders {
                headers,
            }));
        }

        if !self.blocked_urls.is_empty() {
            commands.push(Command::Network(NetworkCommand::SetBlockedUrls {
                urls: self.blocked_urls.clone(),
            }));
        }

        commands
    }
}

// ============================================================================
// Page - Settings
// ============================================================================

impl Page {
    /// Applies `settings` to this page.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error.
    pub async fn apply_settings(&self, settings: &PageSettings, deadline: &Deadline) -> Result<()> {
        let commands = settings.commands();
        if commands.is_empty() {
            return Ok(());
        }

        debug!(
            session_id = %self.inner.session_id,
            count = commands.len(),
            "Applying page settings"
        );
        for command in commands {
            self.send(command, deadline).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
