//! Two-tier bearer token store
//!
//! Holds the access and refresh tokens under fixed keys, writing through an
//! encrypted primary tier and degrading to the plain fallback tier when the
//! crypto layer fails. Degradation is deliberate: a crypto error that threw
//! would lose the tokens and force a logout, which is strictly worse than
//! storing them unencrypted, so failures here are logged and absorbed.

use tracing::warn;

use super::{encrypted::CIPHERTEXT_PREFIX, DynKeyValueStore, EncryptedStore};
use crate::models::TokenPair;
use anyhow::Result;
use std::sync::Arc;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Token store with an encrypted primary tier and a plain fallback tier.
///
/// This is the exclusive owner of the durable token slots; the session
/// container only caches copies for cheap reads.
pub struct TokenStore {
    primary: DynKeyValueStore,
    fallback: DynKeyValueStore,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Build a token store from an explicit primary and fallback tier.
    ///
    /// Normal wiring passes an [`EncryptedStore`] wrapping the same plain
    /// store that serves as the fallback, so a degraded write lands in the
    /// slot a degraded read will later consult.
    pub fn new(primary: DynKeyValueStore, fallback: DynKeyValueStore) -> Self {
        Self { primary, fallback }
    }

    /// Build the standard two-tier store over `plain`, deriving the
    /// encryption key from an optional operator secret (device fingerprint
    /// when absent).
    pub fn with_secret(plain: DynKeyValueStore, secret: Option<&str>) -> Self {
        let primary = Arc::new(EncryptedStore::with_secret(plain.clone(), secret));
        Self::new(primary, plain)
    }

    /// Store both tokens, overwriting any previous pair.
    ///
    /// On encryption failure the pair is written to the plain fallback tier
    /// instead; that is a degraded-security event, not a fatal error.
    pub fn set_tokens(&self, tokens: &TokenPair) -> Result<()> {
        let encrypted_write = self
            .primary
            .set(ACCESS_TOKEN_KEY, &tokens.access_token)
            .and_then(|_| self.primary.set(REFRESH_TOKEN_KEY, &tokens.refresh_token));

        if let Err(err) = encrypted_write {
            warn!("Token encryption failed, storing tokens unencrypted: {err:#}");
            self.fallback.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
            self.fallback.set(REFRESH_TOKEN_KEY, &tokens.refresh_token)?;
        }

        Ok(())
    }

    /// Get the access token, or `None` if absent or unreadable
    pub fn get_access_token(&self) -> Option<String> {
        self.get_token(ACCESS_TOKEN_KEY)
    }

    /// Get the refresh token, or `None` if absent or unreadable
    pub fn get_refresh_token(&self) -> Option<String> {
        self.get_token(REFRESH_TOKEN_KEY)
    }

    /// Remove both tokens from both tiers
    pub fn clear_tokens(&self) -> Result<()> {
        // The encrypted tier removes through to the same slots, but clear
        // both tiers anyway in case the wiring ever separates them.
        self.primary.remove(ACCESS_TOKEN_KEY)?;
        self.primary.remove(REFRESH_TOKEN_KEY)?;
        self.fallback.remove(ACCESS_TOKEN_KEY)?;
        self.fallback.remove(REFRESH_TOKEN_KEY)?;
        Ok(())
    }

    /// True iff a refresh token is present.
    ///
    /// A session with only a refresh token is recoverable (the guard will
    /// exchange it), which is why presence of the refresh token alone counts
    /// as "has tokens".
    pub fn has_tokens(&self) -> bool {
        self.get_refresh_token().is_some()
    }

    /// True iff both tokens are present
    pub fn has_valid_session(&self) -> bool {
        self.get_access_token().is_some() && self.get_refresh_token().is_some()
    }

    fn get_token(&self, key: &str) -> Option<String> {
        match self.primary.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!("Token decryption failed for '{key}', trying plain storage: {err:#}");
                self.read_fallback(key)
            }
        }
    }

    fn read_fallback(&self, key: &str) -> Option<String> {
        match self.fallback.get(key) {
            // A value written by the degraded path is plaintext. Anything
            // still carrying the ciphertext prefix is unreadable here.
            Ok(Some(value)) if !value.starts_with(CIPHERTEXT_PREFIX) => Some(value),
            Ok(_) => None,
            Err(err) => {
                warn!("Plain token read failed for '{key}': {err:#}");
                None
            }
        }
    }
}
