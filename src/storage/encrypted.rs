//! Encrypted key-value store
//!
//! Wraps any plain [`KeyValueStore`] and encrypts values with
//! ChaCha20-Poly1305 before they reach the underlying tier. The key is
//! derived from an operator-supplied secret when one is configured, or from
//! a hash of stable device properties as a weaker fallback, so a copied
//! storage file is not readable on another machine.
//!
//! Encrypted values carry a version prefix so a reader can tell ciphertext
//! from a plaintext value written by the degraded fallback path.

use anyhow::{anyhow, Context, Result};
use chacha20poly1305::{aead::Aead, aead::KeyInit, ChaCha20Poly1305, Key, Nonce};
use data_encoding::{BASE64, BASE64URL_NOPAD, HEXLOWER_PERMISSIVE};
use sha2::{Digest, Sha256};

use super::{DynKeyValueStore, KeyValueStore};

/// Prefix marking a value as versioned ciphertext
pub(crate) const CIPHERTEXT_PREFIX: &str = "enc1.";

const NONCE_LEN: usize = 12;

/// Parse operator-supplied key material into a 32-byte key.
///
/// Accepts, in order: 64 hex characters, url-safe or standard base64 of 32
/// bytes, or a raw 32-byte string. Anything else is treated as a passphrase
/// and hashed with SHA-256 so short human secrets still produce a full key.
pub fn derive_key_from_secret(raw: &str) -> [u8; 32] {
    let trimmed = raw.trim();

    if trimmed.len() == 64 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(bytes) = HEXLOWER_PERMISSIVE.decode(trimmed.as_bytes()) {
            if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
                return key;
            }
        }
    }

    if let Ok(bytes) = BASE64URL_NOPAD.decode(trimmed.as_bytes()) {
        if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
            return key;
        }
    }

    if let Ok(bytes) = BASE64.decode(trimmed.as_bytes()) {
        if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
            return key;
        }
    }

    if let Ok(key) = <[u8; 32]>::try_from(trimmed.as_bytes()) {
        return key;
    }

    Sha256::digest(trimmed.as_bytes()).into()
}

/// Derive a key from stable device properties.
///
/// Weaker than an operator secret: it only ties the stored tokens to the
/// machine they were written on. Used when no secret is configured.
pub fn derive_device_key() -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"mojeeb-session.device.v1");
    if let Some(host) = sysinfo::System::host_name() {
        hasher.update(host.as_bytes());
    }
    if let Some(os) = sysinfo::System::name() {
        hasher.update(os.as_bytes());
    }
    if let Some(version) = sysinfo::System::os_version() {
        hasher.update(version.as_bytes());
    }
    hasher.finalize().into()
}

/// Encrypt a value into the versioned wire form: `enc1.` + base64(nonce || ct)
pub(crate) fn encrypt_value(key: &[u8; 32], plaintext: &str) -> Result<String> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce_bytes).context("Failed to generate nonce")?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| anyhow!("Encryption failed"))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);

    Ok(format!(
        "{}{}",
        CIPHERTEXT_PREFIX,
        BASE64URL_NOPAD.encode(&payload)
    ))
}

/// Decrypt a value previously produced by [`encrypt_value`]
pub(crate) fn decrypt_value(key: &[u8; 32], encoded: &str) -> Result<String> {
    let body = encoded
        .strip_prefix(CIPHERTEXT_PREFIX)
        .ok_or_else(|| anyhow!("Value is not ciphertext"))?;

    let payload = BASE64URL_NOPAD
        .decode(body.as_bytes())
        .context("Invalid ciphertext encoding")?;

    if payload.len() <= NONCE_LEN {
        return Err(anyhow!("Ciphertext too short"));
    }

    let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow!("Decryption failed"))?;

    String::from_utf8(plaintext).context("Decrypted value is not valid UTF-8")
}

/// Encrypting wrapper around a plain store.
///
/// Implements the same [`KeyValueStore`] interface as the tier it wraps, so
/// callers can hold either tier behind the same handle. Decryption failures
/// surface as errors rather than `None`, letting the caller decide whether
/// to fall back to a plain read.
pub struct EncryptedStore {
    inner: DynKeyValueStore,
    key: [u8; 32],
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("EncryptedStore").finish_non_exhaustive()
    }
}

impl EncryptedStore {
    /// Wrap `inner` with the given 32-byte key
    pub fn new(inner: DynKeyValueStore, key: [u8; 32]) -> Self {
        Self { inner, key }
    }

    /// Wrap `inner`, deriving the key from an optional operator secret.
    ///
    /// Falls back to the device fingerprint key when no secret is given.
    pub fn with_secret(inner: DynKeyValueStore, secret: Option<&str>) -> Self {
        let key = match secret {
            Some(secret) => derive_key_from_secret(secret),
            None => derive_device_key(),
        };
        Self::new(inner, key)
    }
}

impl KeyValueStore for EncryptedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.inner.get(key)? {
            Some(value) => Ok(Some(decrypt_value(&self.key, &value)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let encrypted = encrypt_value(&self.key, value)?;
        self.inner.set(key, &encrypted)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn test_key() -> [u8; 32] {
        derive_key_from_secret("test-secret")
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = test_key();
        let encrypted = encrypt_value(&key, "hello tokens").unwrap();

        assert!(encrypted.starts_with(CIPHERTEXT_PREFIX));
        assert_eq!(decrypt_value(&key, &encrypted).unwrap(), "hello tokens");
    }

    #[test]
    fn test_ciphertext_differs_per_write() {
        // Fresh nonce each time, so identical plaintexts encrypt differently.
        let key = test_key();
        let a = encrypt_value(&key, "same").unwrap();
        let b = encrypt_value(&key, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let encrypted = encrypt_value(&test_key(), "secret").unwrap();
        let other = derive_key_from_secret("other-secret");

        assert!(decrypt_value(&other, &encrypted).is_err());
    }

    #[test]
    fn test_decrypt_rejects_plaintext() {
        assert!(decrypt_value(&test_key(), "just a plain value").is_err());
    }

    #[test]
    fn test_derive_key_from_hex() {
        let hex = "a".repeat(64);
        let key = derive_key_from_secret(&hex);
        assert_eq!(key, [0xaa; 32]);
    }

    #[test]
    fn test_derive_key_from_passphrase_is_stable() {
        let a = derive_key_from_secret("correct horse battery staple");
        let b = derive_key_from_secret("correct horse battery staple");
        assert_eq!(a, b);
        assert_ne!(a, derive_key_from_secret("something else"));
    }

    #[test]
    fn test_store_round_trip_through_plain_tier() {
        let plain = Arc::new(MemoryStore::new());
        let store = EncryptedStore::new(plain.clone(), test_key());

        store.set("access_token", "tok-123").unwrap();

        // The plain tier only ever sees ciphertext.
        let raw = plain.get("access_token").unwrap().unwrap();
        assert!(raw.starts_with(CIPHERTEXT_PREFIX));
        assert!(!raw.contains("tok-123"));

        assert_eq!(
            store.get("access_token").unwrap(),
            Some("tok-123".to_string())
        );
    }

    #[test]
    fn test_get_missing_key_is_none() {
        let store = EncryptedStore::new(Arc::new(MemoryStore::new()), test_key());
        assert_eq!(store.get("nope").unwrap(), None);
    }

    #[test]
    fn test_get_undecryptable_value_is_error() {
        let plain = Arc::new(MemoryStore::new());
        plain.set("access_token", "plain-tok").unwrap();

        let store = EncryptedStore::new(plain, test_key());
        assert!(store.get("access_token").is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// Encryption round-trip is lossless for arbitrary token strings.
            #[test]
            fn property_round_trip_lossless(value in "\\PC{0,128}") {
                let key = derive_key_from_secret("prop-secret");
                let encrypted = encrypt_value(&key, &value).unwrap();
                prop_assert_eq!(decrypt_value(&key, &encrypted).unwrap(), value);
            }

            /// Every secret deterministically maps to exactly one key.
            #[test]
            fn property_key_derivation_is_deterministic(secret in "\\PC{1,64}") {
                prop_assert_eq!(
                    derive_key_from_secret(&secret),
                    derive_key_from_secret(&secret)
                );
            }
        }
    }
}
