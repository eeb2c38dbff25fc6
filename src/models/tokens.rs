//! Bearer token pair model

use serde::{Deserialize, Serialize};

/// A matched access/refresh token pair issued by the auth backend.
///
/// Both tokens are opaque bearer strings. The access token is short-lived
/// (15 minutes by platform contract); the refresh token is longer-lived and
/// single-use: each refresh exchange invalidates it and yields a new pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer credential sent on each API call
    pub access_token: String,
    /// Longer-lived credential exchanged for a new pair
    pub refresh_token: String,
}

impl TokenPair {
    /// Create a new token pair
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}
