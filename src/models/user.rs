//! User model
//!
//! The user record is created from the auth backend's login/registration
//! response and replaced wholesale on each subsequent auth response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a user within their organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Organization owner
    Owner,
    /// Administrator
    Admin,
    /// Regular team member (default)
    #[default]
    Member,
}

/// An authenticated user of the Mojeeb console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID
    pub id: String,
    /// Email address
    pub email: String,
    /// Display name
    pub name: String,
    /// Role within the organization
    #[serde(default)]
    pub role: UserRole,
    /// Phone number, if provided
    #[serde(default)]
    pub phone: Option<String>,
    /// Avatar image URL, if set
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// OAuth provider name (e.g. "google"), when the account was created
    /// through an OAuth flow
    #[serde(default)]
    pub oauth_provider: Option<String>,
    /// Provider-side account ID for OAuth accounts
    #[serde(default)]
    pub oauth_id: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
impl User {
    /// Build a minimal user for tests
    pub(crate) fn test_user(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: id.to_string(),
            role: UserRole::Member,
            phone: None,
            avatar_url: None,
            oauth_provider: None,
            oauth_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
