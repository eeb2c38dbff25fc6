//! Proactive token refresh scheduler
//!
//! Background task that keeps the access token fresh while a session is
//! active, exchanging the refresh token on a fixed interval (80% of the
//! access token lifetime by default) so the token is replaced well before
//! it expires.
//!
//! The scheduler is deliberately dumb about failure: if a tick finds the
//! session unauthenticated or the refresh token gone, or the exchange
//! fails, it stops itself and does nothing else. Forcing a logout is not
//! its decision; that belongs to whichever component next observes a real
//! authentication failure.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::RefreshConfig;
use crate::models::TokenPair;
use crate::services::session::{SessionError, SessionManager};

/// Timer-driven background refresher for an authenticated session.
///
/// Owned by whatever top-level component manages the session lifecycle;
/// dropping the scheduler cancels its task, so tests and shutdowns never
/// leak timers.
pub struct RefreshScheduler {
    manager: Arc<SessionManager>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Create a scheduler with an explicit tick interval
    pub fn new(manager: Arc<SessionManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Create a scheduler with the interval from the refresh configuration
    pub fn from_config(manager: Arc<SessionManager>, config: &RefreshConfig) -> Self {
        Self::new(manager, config.interval())
    }

    /// Start the recurring refresh task. No-op if already running.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Refresh scheduler already running");
            return;
        }

        let manager = Arc::clone(&self.manager);
        let interval = self.interval;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately;
            // consume it so the first refresh happens one interval in.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if !manager.is_authenticated() {
                    debug!("Session no longer authenticated, stopping refresh scheduler");
                    break;
                }
                if !manager.has_refresh_token() {
                    // Expected terminal state, not a failure.
                    debug!("No refresh token available, stopping refresh scheduler");
                    break;
                }

                match manager.refresh().await {
                    Ok(_) => debug!("Proactive token refresh succeeded"),
                    Err(err) => {
                        // No logout here; the next real 401 owns that call.
                        warn!("Proactive token refresh failed, stopping scheduler: {err}");
                        break;
                    }
                }
            }
        }));

        debug!(interval_seconds = self.interval.as_secs(), "Refresh scheduler started");
    }

    /// Cancel the refresh task. Idempotent.
    pub fn stop(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = handle.take() {
            handle.abort();
            debug!("Refresh scheduler stopped");
        }
    }

    /// True while the refresh task is live
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run the shared refresh operation immediately, independent of the
    /// timer
    pub async fn refresh_now(&self) -> Result<TokenPair, SessionError> {
        self.manager.refresh().await
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
