//! Persistent key-value storage layer
//!
//! This module provides the storage abstraction backing the session
//! subsystem. It supports:
//! - In-memory store - for tests and ephemeral sessions
//! - File-backed store - default, a single JSON document on disk
//! - Encrypted store - wraps any plain store with ChaCha20-Poly1305
//!
//! The [`TokenStore`] on top of these is the only component that handles
//! bearer tokens directly. It writes through the encrypted tier and falls
//! back to plain storage when the crypto layer fails, because losing the
//! tokens would force an unwanted logout.
//!
//! All storage operations are synchronous. The values involved are a few
//! hundred bytes and the stores are consulted on the hot path of every
//! rehydration, so blocking reads keep the consistency rules simple.

pub mod encrypted;
pub mod file;
pub mod memory;
pub mod token_store;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::config::StorageConfig;

pub use encrypted::EncryptedStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use token_store::TokenStore;

/// Key-value store interface implemented by every storage tier.
///
/// Both the plain stores and [`EncryptedStore`] implement this trait, which
/// is what lets the token store treat "encrypted primary" and "plain
/// fallback" uniformly.
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, or `None` if absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, overwriting any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`; no-op if absent
    fn remove(&self, key: &str) -> Result<()>;
}

/// Shared handle to a key-value store
pub type DynKeyValueStore = Arc<dyn KeyValueStore>;

/// Create the plain storage tier described by the configuration.
///
/// A configured path yields a [`FileStore`] at that location; without a
/// path the store is purely in-memory and the session will not survive a
/// process restart.
pub fn create_store(config: &StorageConfig) -> Result<DynKeyValueStore> {
    match &config.path {
        Some(path) => Ok(Arc::new(FileStore::new(Path::new(path))?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
