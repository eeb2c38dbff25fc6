//! Session model
//!
//! The `Session` is the in-memory view of the current authentication state:
//! the current user, cached copies of both tokens, and the derived
//! `is_authenticated` flag. The canonical token values live in the token
//! store; the session only caches them for cheap reads.
//!
//! `PersistedSession` is the subset written to persistent storage. The
//! access token is deliberately excluded from it: after a restart it must
//! always be re-derived through a refresh exchange, which keeps the exposure
//! window of the short-lived credential as small as possible.

use serde::{Deserialize, Serialize};

use crate::models::User;

/// In-memory authentication state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Current user, if any
    pub user: Option<User>,
    /// Cached access token (canonical copy lives in the token store)
    pub access_token: Option<String>,
    /// Cached refresh token (canonical copy lives in the token store)
    pub refresh_token: Option<String>,
    /// Derived flag: true only when both a user and a live access token
    /// are present. Never settable independently of the fields above.
    pub is_authenticated: bool,
}

/// Subset of the session written to persistent storage.
///
/// Excludes the access token. The persisted `is_authenticated` value is
/// recorded but never trusted on load; see [`Session::rehydrate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Current user, if any
    #[serde(default)]
    pub user: Option<User>,
    /// Refresh token at the time of persistence
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Authentication flag at the time of persistence (informational only)
    #[serde(default)]
    pub is_authenticated: bool,
}

impl Session {
    /// Create an empty, unauthenticated session
    pub fn empty() -> Self {
        Self::default()
    }

    /// Extract the persisted subset of this session
    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            user: self.user.clone(),
            refresh_token: self.refresh_token.clone(),
            is_authenticated: self.is_authenticated,
        }
    }

    /// Rebuild a session from persisted state.
    ///
    /// `access_token` is whatever the token store can currently produce,
    /// which is the only evidence that counts toward `is_authenticated`:
    ///
    /// - user and refresh token present, access token retrievable →
    ///   authenticated
    /// - user and refresh token present, access token missing →
    ///   *not* authenticated; the caller must refresh before rendering
    ///   protected content
    /// - user or refresh token absent → not authenticated, unconditionally
    ///
    /// The persisted `is_authenticated` flag is ignored on purpose. Trusting
    /// it would let the UI render as authenticated while the first API call
    /// 401s (the access token was never persisted), which bounces the user
    /// between the login redirect and a route guard that still sees the
    /// stale flag.
    pub fn rehydrate(persisted: PersistedSession, access_token: Option<String>) -> Self {
        let has_identity = persisted.user.is_some() && persisted.refresh_token.is_some();
        let is_authenticated = has_identity && access_token.is_some();

        Self {
            user: persisted.user,
            access_token: if has_identity { access_token } else { None },
            refresh_token: persisted.refresh_token,
            is_authenticated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_session_is_unauthenticated() {
        let session = Session::empty();
        assert!(session.user.is_none());
        assert!(session.access_token.is_none());
        assert!(session.refresh_token.is_none());
        assert!(!session.is_authenticated);
    }

    #[test]
    fn test_rehydrate_with_access_token_is_authenticated() {
        let persisted = PersistedSession {
            user: Some(User::test_user("u1")),
            refresh_token: Some("refresh-1".to_string()),
            is_authenticated: true,
        };

        let session = Session::rehydrate(persisted, Some("access-1".to_string()));

        assert!(session.is_authenticated);
        assert_eq!(session.access_token.as_deref(), Some("access-1"));
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_rehydrate_ignores_persisted_flag_when_access_token_missing() {
        // Persisted state claims authenticated, but the token store has no
        // access token. The flag must come out false.
        let persisted = PersistedSession {
            user: Some(User::test_user("u1")),
            refresh_token: Some("refresh-1".to_string()),
            is_authenticated: true,
        };

        let session = Session::rehydrate(persisted, None);

        assert!(!session.is_authenticated);
        assert!(session.access_token.is_none());
        // The refresh token survives so the guard can attempt a refresh.
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_rehydrate_without_user_is_never_authenticated() {
        let persisted = PersistedSession {
            user: None,
            refresh_token: Some("refresh-1".to_string()),
            is_authenticated: true,
        };

        let session = Session::rehydrate(persisted, Some("access-1".to_string()));

        assert!(!session.is_authenticated);
        assert!(session.access_token.is_none());
    }

    #[test]
    fn test_rehydrate_without_refresh_token_is_never_authenticated() {
        let persisted = PersistedSession {
            user: Some(User::test_user("u1")),
            refresh_token: None,
            is_authenticated: true,
        };

        let session = Session::rehydrate(persisted, Some("access-1".to_string()));

        assert!(!session.is_authenticated);
    }

    #[test]
    fn test_to_persisted_drops_access_token() {
        let session = Session {
            user: Some(User::test_user("u1")),
            access_token: Some("access-1".to_string()),
            refresh_token: Some("refresh-1".to_string()),
            is_authenticated: true,
        };

        let persisted = session.to_persisted();
        let json = serde_json::to_string(&persisted).unwrap();

        assert!(!json.contains("access-1"));
        assert_eq!(persisted.refresh_token.as_deref(), Some("refresh-1"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// Rehydration never reports authenticated without an access
            /// token, regardless of what the persisted flag claims.
            #[test]
            fn property_rehydrate_requires_access_token(
                has_user in any::<bool>(),
                refresh in proptest::option::of("[a-zA-Z0-9]{8,32}"),
                persisted_flag in any::<bool>(),
            ) {
                let persisted = PersistedSession {
                    user: has_user.then(|| User::test_user("u1")),
                    refresh_token: refresh,
                    is_authenticated: persisted_flag,
                };

                let session = Session::rehydrate(persisted, None);
                prop_assert!(!session.is_authenticated);
            }

            /// Rehydration reports authenticated iff user, refresh token
            /// and access token are all present.
            #[test]
            fn property_rehydrate_derives_flag_from_presence(
                has_user in any::<bool>(),
                refresh in proptest::option::of("[a-zA-Z0-9]{8,32}"),
                access in proptest::option::of("[a-zA-Z0-9]{8,32}"),
            ) {
                let persisted = PersistedSession {
                    user: has_user.then(|| User::test_user("u1")),
                    refresh_token: refresh.clone(),
                    is_authenticated: true,
                };

                let session = Session::rehydrate(persisted, access.clone());
                let expected = has_user && refresh.is_some() && access.is_some();
                prop_assert_eq!(session.is_authenticated, expected);
            }
        }
    }
}
