//! Navigation and readiness waiting.

use std::time::Instant;

use tracing::{debug, info};

use crate::deadline::{Deadline, millis};
use crate::error::{Error, Result};
use crate::protocol::{Command, PageCommand};

use super::Page;
use super::readiness::{IdlePolicy, PageFailure, PageState};

// ============================================================================
// Page - Navigation
// ============================================================================

impl Page {
    /// Navigates to a URL.
    ///
    /// Resets readiness to `Navigating`. Readiness signals from any earlier
    /// navigation are discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::NavigationFailed`] if the browser reports an `errorText`
    /// - [`Error::SessionClosed`] if the page is closed or failed
    /// - any call error from `Page.navigate`
    pub async fn navigate(&self, url: &str, deadline: &Deadline) -> Result<()> {
        self.ensure_open()?;

        // Fold in anything still queued so it is attributed to the old
        // navigation, not the new one.
        self.drain_queued_events().await;

        if !self
            .inner
            .tracker
            .lock()
            .begin_navigation(url, Instant::now())
        {
            return Err(self.failure_error());
        }

        debug!(url = %url, session_id = %self.inner.session_id, "Navigating");

        let result = match self
            .send(
                Command::Page(PageCommand::Navigate {
                    url: url.to_string(),
                }),
                deadline,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.inner.tracker.lock().fail(PageFailure::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Some(error_text) = result
            .get("errorText")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            self.inner.tracker.lock().fail(PageFailure::Navigation {
                url: url.to_string(),
                reason: error_text.to_string(),
            });
            return Err(Error::navigation_failed(url, error_text));
        }

        if let Some(loader_id) = result.get("loaderId").and_then(|v| v.as_str()) {
            self.inner.tracker.lock().set_loader(loader_id);
        }
        Ok(())
    }

    /// Waits until the page is `NetworkIdle` under `policy`.
    ///
    /// On deadline expiry the page is failed and a best-effort
    /// `Page.stopLoading` is sent.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the deadline passes first
    /// - [`Error::NavigationFailed`], [`Error::TargetCrashed`] or
    ///   [`Error::ConnectionClosed`] if the page fails while waiting
    pub async fn wait_until_ready(&self, policy: &IdlePolicy, deadline: &Deadline) -> Result<()> {
        let mut events = self.inner.events.lock().await;
        let started = Instant::now();

        loop {
            let (state, wakeup) = {
                let mut tracker = self.inner.tracker.lock();
                tracker.poll(Instant::now(), policy);
                (tracker.state(), tracker.next_wakeup(policy))
            };

            match state {
                PageState::NetworkIdle | PageState::Converting => {
                    info!(
                        session_id = %self.inner.session_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Page ready"
                    );
                    return Ok(());
                }
                PageState::Failed => return Err(self.failure_error()),
                PageState::Closed => {
                    return Err(Error::session_closed(self.inner.session_id.clone()));
                }
                PageState::Created => {
                    return Err(Error::config("page has not been navigated"));
                }
                PageState::Navigating | PageState::DomReady => {}
            }

            let wake_at = wakeup.map_or(deadline.instant(), |w| w.min(deadline.instant()));

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.inner.tracker.lock().apply(&event.parse(), Instant::now());
                    }
                    None => {
                        self.inner.tracker.lock().fail(PageFailure::ConnectionClosed);
                    }
                },

                () = tokio::time::sleep_until(wake_at.into()) => {
                    if deadline.is_expired() {
                        self.inner.tracker.lock().fail(PageFailure::DeadlineExceeded {
                            budget_ms: millis(deadline.budget()),
                        });
                        drop(events);
                        self.send_cleanup(Command::Page(PageCommand::StopLoading)).await;
                        return Err(deadline.expired("wait for page readiness"));
                    }
                }
            }
        }
    }

    /// Applies every queued event without waiting.
    async fn drain_queued_events(&self) {
        let mut events = self.inner.events.lock().await;
        let now = Instant::now();
        while let Some(event) = events.try_recv() {
            self.inner.tracker.lock().apply(&event.parse(), now);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::browser::page::{IdlePolicy, Page, PageState};
    use crate::deadline::Deadline;
    use crate::error::{Error, ErrorKind};
    use crate::transport::mock::{self, MockBrowser, ScriptedPage};
    use crate::transport::{Connection, ConnectionConfig};

    const QUICK: IdlePolicy = IdlePolicy {
        quiet_window: Duration::from_millis(50),
        fallback: None,
    };

    async fn open(script: ScriptedPage) -> (MockBrowser, Connection, Page) {
        let mock = MockBrowser::start(script.into_responder()).await;
        let connection = Connection::open(&mock.ws_url(), ConnectionConfig::default())
            .await
            .expect("connect");
        let page = Page::attach(
            &connection,
            Duration::from_secs(5),
            &Deadline::after(Duration::from_secs(5)),
        )
        .await
        .expect("attach");
        (mock, connection, page)
    }

    #[tokio::test]
    async fn test_static_document_settles_after_quiet_window() {
        let (_mock, _connection, page) = open(ScriptedPage::default()).await;
        let deadline = Deadline::after(Duration::from_secs(5));

        page.navigate("file:///tmp/static.html", &deadline)
            .await
            .expect("navigate");
        page.wait_until_ready(&QUICK, &deadline)
            .await
            .expect("ready");
        assert_eq!(page.state(), PageState::NetworkIdle);
    }

    #[tokio::test]
    async fn test_network_idle_event_settles_immediately() {
        let script = ScriptedPage {
            idle_event: true,
            ..ScriptedPage::default()
        };
        let (_mock, _connection, page) = open(script).await;
        let deadline = Deadline::after(Duration::from_secs(5));
        let slow = IdlePolicy {
            quiet_window: Duration::from_secs(60),
            fallback: None,
        };

        page.navigate("https://example.com/", &deadline)
            .await
            .expect("navigate");
        tokio::time::timeout(Duration::from_secs(2), page.wait_until_ready(&slow, &deadline))
            .await
            .expect("settles on the lifecycle event")
            .expect("ready");
    }

    #[tokio::test]
    async fn test_never_idle_times_out_and_stops_loading() {
        let script = ScriptedPage {
            hanging_request: true,
            ..ScriptedPage::default()
        };
        let (mock, _connection, page) = open(script).await;
        let deadline = Deadline::after(Duration::from_millis(300));

        page.navigate("https://example.com/", &deadline)
            .await
            .expect("navigate");
        let err = page.wait_until_ready(&QUICK, &deadline).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(page.state(), PageState::Failed);
        assert!(mock.methods().iter().any(|m| m == "Page.stopLoading"));

        let again = page.wait_until_ready(&QUICK, &deadline).await.unwrap_err();
        assert!(again.is_timeout());
        assert!(again.to_string().contains("300ms"));
    }

    #[tokio::test]
    async fn test_close_interrupts_wait() {
        let script = ScriptedPage {
            hanging_request: true,
            ..ScriptedPage::default()
        };
        let (_mock, _connection, page) = open(script).await;
        let deadline = Deadline::after(Duration::from_secs(30));

        page.navigate("https://example.com/", &deadline)
            .await
            .expect("navigate");

        let waiter = page.clone();
        let wait = tokio::spawn(async move { waiter.wait_until_ready(&QUICK, &deadline).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), page.close())
            .await
            .expect("close does not wait for the deadline");
        let err = tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .expect("wait returns after close")
            .expect("join")
            .unwrap_err();
        assert!(matches!(err, Error::SessionClosed { .. }));
        assert_eq!(page.state(), PageState::Closed);
    }

    #[tokio::test]
    async fn test_fallback_settles_hanging_page() {
        let script = ScriptedPage {
            hanging_request: true,
            ..ScriptedPage::default()
        };
        let (_mock, _connection, page) = open(script).await;
        let deadline = Deadline::after(Duration::from_secs(5));
        let policy = QUICK.with_fallback(Duration::from_millis(100));

        page.navigate("https://example.com/", &deadline)
            .await
            .expect("navigate");
        page.wait_until_ready(&policy, &deadline)
            .await
            .expect("fallback");
    }

    #[tokio::test]
    async fn test_navigation_error_text() {
        let script = ScriptedPage {
            navigation_error: Some("net::ERR_NAME_NOT_RESOLVED".into()),
            ..ScriptedPage::default()
        };
        let (_mock, _connection, page) = open(script).await;
        let deadline = Deadline::after(Duration::from_secs(5));

        let err = page
            .navigate("https://nowhere.invalid/", &deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NavigationFailed { ref reason, .. } if reason == "net::ERR_NAME_NOT_RESOLVED"));
        assert_eq!(page.state(), PageState::Failed);

        let again = page
            .wait_until_ready(&QUICK, &deadline)
            .await
            .unwrap_err();
        assert_eq!(again.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_crash_while_waiting() {
        let script = ScriptedPage {
            hanging_request: true,
            ..ScriptedPage::default()
        };
        let (mock, _connection, page) = open(script).await;
        let deadline = Deadline::after(Duration::from_secs(5));

        page.navigate("https://example.com/", &deadline)
            .await
            .expect("navigate");
        mock.push(mock::event("Inspector.targetCrashed", json!({}), Some("S1")));

        let err = page.wait_until_ready(&QUICK, &deadline).await.unwrap_err();
        assert!(matches!(err, Error::TargetCrashed { .. }));
    }

    #[tokio::test]
    async fn test_transport_closure_fails_wait() {
        let script = ScriptedPage {
            hanging_request: true,
            ..ScriptedPage::default()
        };
        let (mock, _connection, page) = open(script).await;
        let deadline = Deadline::after(Duration::from_secs(5));

        page.navigate("https://example.com/", &deadline)
            .await
            .expect("navigate");
        mock.close();

        let err = page.wait_until_ready(&QUICK, &deadline).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_renavigation_resets_readiness() {
        let (_mock, _connection, page) = open(ScriptedPage::default()).await;
        let deadline = Deadline::after(Duration::from_secs(5));

        page.navigate("https://example.com/one", &deadline)
            .await
            .expect("navigate");
        page.wait_until_ready(&QUICK, &deadline)
            .await
            .expect("ready");

        page.navigate("https://example.com/two", &deadline)
            .await
            .expect("navigate again");
        assert_eq!(page.state(), PageState::Navigating);
        page.wait_until_ready(&QUICK, &deadline)
            .await
            .expect("ready again");
    }

    #[tokio::test]
    async fn test_wait_before_navigate_is_rejected() {
        let (_mock, _connection, page) = open(ScriptedPage::default()).await;
        let err = page
            .wait_until_ready(&QUICK, &Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
