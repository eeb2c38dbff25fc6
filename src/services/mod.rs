//! Business logic services
//!
//! This module contains the session subsystem's moving parts:
//! - `auth_client` - the HTTP boundary to the auth backend
//! - `session` - the session state container and shared refresh operation
//! - `scheduler` - the proactive background token refresh task
//! - `guard` - startup and app-resume reconciliation

pub mod auth_client;
pub mod guard;
pub mod scheduler;
pub mod session;

pub use auth_client::{AuthApi, AuthError, AuthResponse, Credentials, HttpAuthClient, RegisterInput};
pub use guard::{GuardOutcome, GuardPhase, ResumeOutcome, StartupGuard};
pub use scheduler::RefreshScheduler;
pub use session::{SessionError, SessionManager};
