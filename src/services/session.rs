//! Session state container
//!
//! `SessionManager` owns the in-memory [`Session`], writes tokens through
//! the [`TokenStore`], and persists the session subset (user, refresh
//! token, flag) under a namespaced key in plain storage. It also hosts the
//! single refresh-and-update code path shared by the background scheduler
//! and the startup guard, so the two can never diverge in how they refresh.
//!
//! The refresh operation is single-flight: refresh tokens are single-use
//! per exchange, so two concurrent refreshes would invalidate each other's
//! pair mid-flight. Concurrent callers are coalesced onto one in-flight
//! exchange and all observe its result.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::models::{PersistedSession, Session, TokenPair, User};
use crate::services::auth_client::{AuthApi, AuthError, Credentials, RegisterInput};
use crate::storage::{DynKeyValueStore, TokenStore};

/// Storage key for the persisted session subset
pub const PERSISTED_SESSION_KEY: &str = "session.v1";

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Authentication failed (login/register/refresh rejected)
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A refresh was requested with no refresh token available
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// A coalesced refresh failed; all waiters observe the same error
    #[error("Refresh failed: {0}")]
    RefreshFailed(#[source] Arc<SessionError>),

    /// Internal error (storage, serialization)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, Arc<SessionError>>>>;

#[derive(Default)]
struct Inflight {
    next_generation: u64,
    current: Option<(u64, SharedRefresh)>,
}

/// Session state container and shared refresh path
pub struct SessionManager {
    auth: Arc<dyn AuthApi>,
    tokens: Arc<TokenStore>,
    state_store: DynKeyValueStore,
    state: Arc<RwLock<Session>>,
    inflight: Mutex<Inflight>,
}

impl SessionManager {
    /// Create a manager with an empty session.
    ///
    /// `state_store` is the plain storage tier holding the persisted
    /// session subset; tokens go exclusively through `tokens`.
    pub fn new(
        auth: Arc<dyn AuthApi>,
        tokens: Arc<TokenStore>,
        state_store: DynKeyValueStore,
    ) -> Self {
        Self {
            auth,
            tokens,
            state_store,
            state: Arc::new(RwLock::new(Session::empty())),
            inflight: Mutex::new(Inflight::default()),
        }
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Current user, if authenticated
    pub fn current_user(&self) -> Option<User> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .user
            .clone()
    }

    /// True if the session is currently authenticated
    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_authenticated
    }

    /// True if the token store currently holds an access token
    pub fn has_access_token(&self) -> bool {
        self.tokens.get_access_token().is_some()
    }

    /// True if the token store currently holds a refresh token
    pub fn has_refresh_token(&self) -> bool {
        self.tokens.get_refresh_token().is_some()
    }

    /// Shared token store handle
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Replace the current user and mark the session authenticated.
    ///
    /// Assumes the caller already holds valid tokens (profile updates,
    /// user payloads piggybacked on API responses).
    pub fn set_user(&self, user: User) -> Result<(), SessionError> {
        let session = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.user = Some(user);
            state.is_authenticated = true;
            state.clone()
        };
        persist_session(&self.state_store, &session)?;
        Ok(())
    }

    /// Store a new token pair: write-through to the token store first,
    /// then update the cached copies.
    pub fn set_tokens(&self, pair: &TokenPair) -> Result<(), SessionError> {
        store_tokens(&self.tokens, &self.state, &self.state_store, pair)
    }

    /// Atomically install a user and token pair after a successful
    /// login/register/OAuth-callback exchange.
    ///
    /// Public so OAuth flows that obtain a pair out of band can install it
    /// through the same path as password logins.
    pub fn set_auth(&self, user: User, pair: &TokenPair) -> Result<(), SessionError> {
        self.tokens
            .set_tokens(pair)
            .map_err(SessionError::Internal)?;

        let session = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.user = Some(user);
            state.access_token = Some(pair.access_token.clone());
            state.refresh_token = Some(pair.refresh_token.clone());
            state.is_authenticated = true;
            state.clone()
        };
        persist_session(&self.state_store, &session)?;
        Ok(())
    }

    /// Clear the token store and reset the session to empty
    pub fn logout(&self) -> Result<(), SessionError> {
        self.tokens.clear_tokens().map_err(SessionError::Internal)?;

        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            *state = Session::empty();
        }
        self.state_store
            .remove(PERSISTED_SESSION_KEY)
            .map_err(SessionError::Internal)?;

        info!("Session cleared");
        Ok(())
    }

    /// Restore the session from persistent storage.
    ///
    /// Runs once at startup, before any auth-dependent rendering. The
    /// authenticated flag is recomputed from current token presence via
    /// [`Session::rehydrate`]; a persisted "authenticated" claim with no
    /// retrievable access token comes back as unauthenticated, which tells
    /// the startup guard to refresh before releasing the UI.
    pub fn rehydrate(&self) -> Result<Session, SessionError> {
        let persisted = match self
            .state_store
            .get(PERSISTED_SESSION_KEY)
            .map_err(SessionError::Internal)?
        {
            Some(json) => serde_json::from_str::<PersistedSession>(&json)
                .map_err(|e| SessionError::Internal(anyhow::anyhow!(e)))?,
            None => PersistedSession::default(),
        };

        let session = Session::rehydrate(persisted, self.tokens.get_access_token());
        debug!(
            is_authenticated = session.is_authenticated,
            has_refresh_token = session.refresh_token.is_some(),
            "Session rehydrated"
        );

        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            *state = session.clone();
        }
        Ok(session)
    }

    /// Log in with credentials and install the resulting session
    pub async fn login(&self, credentials: &Credentials) -> Result<User, SessionError> {
        let response = self.auth.login(credentials).await?;
        self.install_auth_response(response)
    }

    /// Register an account and install the resulting session
    pub async fn register(&self, input: &RegisterInput) -> Result<User, SessionError> {
        let response = self.auth.register(input).await?;
        self.install_auth_response(response)
    }

    fn install_auth_response(
        &self,
        response: crate::services::auth_client::AuthResponse,
    ) -> Result<User, SessionError> {
        let user = response.user.ok_or_else(|| {
            SessionError::Auth(AuthError::InvalidResponse(
                "response is missing the user record".to_string(),
            ))
        })?;
        let pair = TokenPair::new(response.access_token, response.refresh_token);
        self.set_auth(user.clone(), &pair)?;
        Ok(user)
    }

    /// Exchange the current refresh token for a new pair and write it
    /// through (token store first, then the in-memory session).
    ///
    /// This is the single refresh path used by the scheduler, the startup
    /// guard and the app-resume check. Concurrent calls coalesce onto one
    /// in-flight exchange. On failure nothing is written; each call site
    /// applies its own post-failure policy.
    pub async fn refresh(&self) -> Result<TokenPair, SessionError> {
        let (generation, shared) = {
            let mut inflight = self.inflight.lock().await;
            match &inflight.current {
                Some((generation, shared)) => {
                    debug!("Joining in-flight refresh");
                    (*generation, shared.clone())
                }
                None => {
                    // Each exchange rotates the token, so it must be read
                    // while holding the slot; a copy taken earlier could
                    // submit an already-consumed value.
                    let refresh_token = self
                        .tokens
                        .get_refresh_token()
                        .ok_or(SessionError::MissingRefreshToken)?;
                    inflight.next_generation += 1;
                    let generation = inflight.next_generation;
                    let shared = perform_refresh(
                        Arc::clone(&self.auth),
                        Arc::clone(&self.tokens),
                        Arc::clone(&self.state),
                        Arc::clone(&self.state_store),
                        refresh_token,
                    )
                    .boxed()
                    .shared();
                    inflight.current = Some((generation, shared.clone()));
                    (generation, shared)
                }
            }
        };

        let result = shared.await;

        // Clear the slot so the next refresh starts a fresh exchange, but
        // only if a newer exchange has not replaced it already.
        {
            let mut inflight = self.inflight.lock().await;
            if matches!(&inflight.current, Some((g, _)) if *g == generation) {
                inflight.current = None;
            }
        }

        result.map_err(SessionError::RefreshFailed)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("is_authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

/// The refresh exchange itself, shared between all coalesced callers.
///
/// Writes the token store before the in-memory session so a crash between
/// the two steps never leaves memory ahead of durable storage. On failure
/// neither is touched.
async fn perform_refresh(
    auth: Arc<dyn AuthApi>,
    tokens: Arc<TokenStore>,
    state: Arc<RwLock<Session>>,
    state_store: DynKeyValueStore,
    refresh_token: String,
) -> Result<TokenPair, Arc<SessionError>> {
    let response = auth
        .refresh(&refresh_token)
        .await
        .map_err(|e| Arc::new(SessionError::Auth(e)))?;

    let pair = TokenPair::new(response.access_token, response.refresh_token);
    store_tokens(&tokens, &state, &state_store, &pair).map_err(Arc::new)?;

    debug!("Token pair refreshed");
    Ok(pair)
}

/// Write a token pair through to the token store, then the cached session
/// copies, then the persisted subset (the refresh token is part of it)
fn store_tokens(
    tokens: &TokenStore,
    state: &RwLock<Session>,
    state_store: &DynKeyValueStore,
    pair: &TokenPair,
) -> Result<(), SessionError> {
    tokens.set_tokens(pair).map_err(SessionError::Internal)?;

    let session = {
        let mut session = state.write().unwrap_or_else(|e| e.into_inner());
        session.access_token = Some(pair.access_token.clone());
        session.refresh_token = Some(pair.refresh_token.clone());
        session.clone()
    };
    persist_session(state_store, &session)?;
    Ok(())
}

fn persist_session(state_store: &DynKeyValueStore, session: &Session) -> Result<(), SessionError> {
    let json = serde_json::to_string(&session.to_persisted())
        .map_err(|e| SessionError::Internal(anyhow::anyhow!(e)))?;
    state_store
        .set(PERSISTED_SESSION_KEY, &json)
        .map_err(SessionError::Internal)
}
