//! Data models for the session subsystem

pub mod session;
pub mod tokens;
pub mod user;

pub use session::{PersistedSession, Session};
pub use tokens::TokenPair;
pub use user::{User, UserRole};
