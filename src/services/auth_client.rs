//! Auth backend client
//!
//! HTTP boundary to the external auth service. The wire format is
//! snake_case JSON (`access_token`, `refresh_token`, embedded `user`),
//! which serde maps directly onto the Rust-native field names, so this is
//! the only place wire conventions are visible.
//!
//! The [`AuthApi`] trait is the seam the session manager is written
//! against; tests substitute a mock, production wires in
//! [`HttpAuthClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AuthConfig;
use crate::models::User;

/// Error types for auth backend calls
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("Auth request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request (4xx/5xx)
    #[error("Auth request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend answered 2xx with a body we cannot use
    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// True if this error is a definitive credential rejection (HTTP 401),
    /// as opposed to a transient transport problem
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Rejected { status: 401, .. })
    }
}

/// Login credentials
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Registration input
#[derive(Debug, Clone, Serialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Successful auth backend response: a fresh token pair, plus the user
/// record on login/register (refresh responses may omit it)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Auth backend interface
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token pair and user record
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError>;

    /// Create an account and log it in
    async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, AuthError>;

    /// Exchange a refresh token for a new token pair.
    ///
    /// Refresh tokens are single-use: a successful exchange invalidates the
    /// submitted token and the response carries its replacement.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError>;
}

/// reqwest-based auth backend client
pub struct HttpAuthClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    /// Build a client from the auth configuration
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, AuthError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| status.to_string());
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: AuthResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        if parsed.access_token.is_empty() || parsed.refresh_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "response is missing token fields".to_string(),
            ));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
        self.post_json("/auth/login", credentials).await
    }

    async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, AuthError> {
        self.post_json("/auth/register", input).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        self.post_json("/auth/refresh", &RefreshRequest { refresh_token })
            .await
    }
}

/// In-memory auth backend double used by the session, scheduler and guard
/// tests. Issues sequentially numbered token pairs so tests can tell
/// exchanges apart, and can be told to delay or reject refresh calls.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct MockAuthApi {
        counter: AtomicUsize,
        refresh_calls: AtomicUsize,
        fail_refresh: AtomicBool,
        refresh_delay: Mutex<Option<Duration>>,
        last_refresh_token: Mutex<Option<String>>,
    }

    impl MockAuthApi {
        pub fn new() -> Self {
            Self {
                counter: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                fail_refresh: AtomicBool::new(false),
                refresh_delay: Mutex::new(None),
                last_refresh_token: Mutex::new(None),
            }
        }

        pub fn set_fail_refresh(&self, fail: bool) {
            self.fail_refresh.store(fail, Ordering::SeqCst);
        }

        pub fn set_refresh_delay(&self, delay: Duration) {
            *self.refresh_delay.lock().unwrap() = Some(delay);
        }

        pub fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        pub fn last_refresh_token(&self) -> Option<String> {
            self.last_refresh_token.lock().unwrap().clone()
        }

        fn next_response(&self, user: Option<User>) -> AuthResponse {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            AuthResponse {
                access_token: format!("access-{n}"),
                refresh_token: format!("refresh-{n}"),
                user,
            }
        }
    }

    #[async_trait]
    impl AuthApi for MockAuthApi {
        async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AuthError> {
            if credentials.password == "wrong" {
                return Err(AuthError::Rejected {
                    status: 401,
                    message: "invalid credentials".to_string(),
                });
            }
            Ok(self.next_response(Some(User::test_user("u1"))))
        }

        async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, AuthError> {
            Ok(self.next_response(Some(User::test_user(&input.name))))
        }

        async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());

            let delay = *self.refresh_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(AuthError::Rejected {
                    status: 401,
                    message: "refresh token expired".to_string(),
                });
            }

            Ok(self.next_response(None))
        }
    }
}
