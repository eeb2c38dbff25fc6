//! Startup and app-resume session reconciliation
//!
//! Before any auth-dependent UI renders, the guard reconciles the three
//! possible token-presence states against the rehydrated session. The
//! access token is never persisted, so a restored session legitimately
//! arrives without one; rehydration reports such a session as
//! unauthenticated on purpose, and it is the guard's job to turn that
//! transitional state into either a validated session (via a refresh) or a
//! clean logout. Trusting the persisted flag instead produces a redirect
//! loop: render as authenticated, first API call 401s, redirect to login,
//! route guard bounces back.
//!
//! Startup fails closed: an unrefreshable session is logged out and sent
//! to the login route. App resume fails open: a resumed app may hold
//! perfectly valid tokens that merely look stale, so a failed refresh
//! keeps the session and defers the logout decision to the next real 401.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::services::session::{SessionError, SessionManager};

/// Route the embedding UI should navigate to when the guard fails closed
pub const LOGIN_ROUTE: &str = "/login";

/// Lifecycle phase of the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    /// Startup validation in progress; auth-dependent UI must not render
    Initializing,
    /// Session resolved; the UI may render
    Stable,
    /// Session was unrecoverable; navigate to the login route
    Redirecting,
}

/// Result of the startup check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session is consistent (authenticated or cleanly logged out)
    Stable,
    /// Session was unrecoverable and has been cleared
    RedirectToLogin,
}

/// Result of the app-resume check. None of these clear the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No session to validate
    NotAuthenticated,
    /// The access token was still present; nothing to do
    StillFresh,
    /// The missing access token was re-derived through a refresh
    Refreshed,
    /// The refresh failed; the session is kept and the next real API 401
    /// owns the logout decision
    RefreshFailed,
}

/// One-time startup check plus the lighter app-resume check
pub struct StartupGuard {
    manager: Arc<SessionManager>,
    phase: RwLock<GuardPhase>,
    reconnecting: AtomicBool,
}

impl StartupGuard {
    /// Create a guard in the `Initializing` phase
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            phase: RwLock::new(GuardPhase::Initializing),
            reconnecting: AtomicBool::new(false),
        }
    }

    /// Current phase; the embedding UI gates rendering on `Stable`
    pub fn phase(&self) -> GuardPhase {
        *self.phase.read().unwrap_or_else(|e| e.into_inner())
    }

    /// True while an app-resume revalidation is in flight; the UI shows a
    /// non-blocking reconnecting indicator
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Run the startup check.
    ///
    /// Evaluates, in order:
    /// 1. no persisted identity → stable, nothing to validate
    /// 2. access and refresh token present → stable
    /// 3. access token missing, refresh token present → refresh and mark
    ///    the session authenticated; on failure, force logout and redirect
    /// 4. an identity with no refresh token is unrecoverable
    ///    (structurally impossible after rehydration, handled defensively)
    ///    → force logout and redirect
    /// 5. any unexpected error → force logout and redirect (fail closed)
    pub async fn initialize(&self) -> GuardOutcome {
        let outcome = match self.evaluate_startup().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Startup session validation failed, failing closed: {err}");
                self.force_logout();
                GuardOutcome::RedirectToLogin
            }
        };

        let phase = match outcome {
            GuardOutcome::Stable => GuardPhase::Stable,
            GuardOutcome::RedirectToLogin => GuardPhase::Redirecting,
        };
        *self.phase.write().unwrap_or_else(|e| e.into_inner()) = phase;
        outcome
    }

    async fn evaluate_startup(&self) -> Result<GuardOutcome, SessionError> {
        let session = self.manager.session();
        let Some(user) = session.user else {
            debug!("No session to validate");
            return Ok(GuardOutcome::Stable);
        };

        let has_access = self.manager.has_access_token();
        let has_refresh = self.manager.has_refresh_token();

        match (has_access, has_refresh) {
            (true, true) => {
                if !session.is_authenticated {
                    self.manager.set_user(user)?;
                }
                debug!("Session tokens present, releasing UI");
                Ok(GuardOutcome::Stable)
            }
            (false, true) => match self.manager.refresh().await {
                Ok(_) => {
                    // Fresh pair in place; the identity is validated.
                    self.manager.set_user(user)?;
                    info!("Access token re-derived on startup");
                    Ok(GuardOutcome::Stable)
                }
                Err(err) => {
                    info!("Startup refresh failed, clearing session: {err}");
                    self.force_logout();
                    Ok(GuardOutcome::RedirectToLogin)
                }
            },
            (_, false) => {
                warn!("Session identity with no recoverable tokens, clearing");
                self.force_logout();
                Ok(GuardOutcome::RedirectToLogin)
            }
        }
    }

    /// Run the lighter app-resume check.
    ///
    /// The UI keeps rendering throughout, with a non-blocking reconnecting
    /// indicator while this is in flight. A failed refresh here does not
    /// log out: only a true 401 from a real API call should end the
    /// session at this point.
    pub async fn on_resume(&self) -> ResumeOutcome {
        if !self.manager.is_authenticated() {
            return ResumeOutcome::NotAuthenticated;
        }

        self.reconnecting.store(true, Ordering::SeqCst);
        let outcome = self.evaluate_resume().await;
        self.reconnecting.store(false, Ordering::SeqCst);
        outcome
    }

    async fn evaluate_resume(&self) -> ResumeOutcome {
        if self.manager.has_access_token() {
            return ResumeOutcome::StillFresh;
        }

        if !self.manager.has_refresh_token() {
            warn!("Resumed session has no tokens, keeping session until an API call decides");
            return ResumeOutcome::RefreshFailed;
        }

        match self.manager.refresh().await {
            Ok(_) => {
                info!("Access token re-derived on resume");
                ResumeOutcome::Refreshed
            }
            Err(err) => {
                warn!("Resume refresh failed, keeping session: {err}");
                ResumeOutcome::RefreshFailed
            }
        }
    }

    fn force_logout(&self) {
        if let Err(err) = self.manager.logout() {
            // Fail-closed path; nothing left to do but record it.
            warn!("Forced logout failed: {err}");
        }
    }
}
