//! Credential and session store consumed by the session manager
//!
//! The store is the only shared mutable state around the core. It is built
//! once at startup and handed to every component as
//! `Arc<dyn CredentialStore>`; nothing in the core holds a global handle.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::Principal;
use crate::types::{Result, SessionId, UserId};

pub use memory::MemoryStore;

/// Stored login credentials for one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user_id: UserId,
    /// PHC formatted password hash
    pub password_hash: String,
}

/// Result of recording a refresh token rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The presented generation was current and has been replaced
    Rotated,
    /// The presented generation was already superseded, ended, or unknown
    Conflict,
}

/// Persistence of grants, credentials and refresh token generations
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Current grants for `user_id`. Called once per request, never cached.
    async fn load_principal(&self, user_id: &UserId) -> Result<Principal>;

    /// Credentials by login email, `None` if no such account
    async fn load_password_hash(&self, email: &str) -> Result<Option<CredentialRecord>>;

    /// Register the first refresh generation of a new session, live until
    /// `expires_at`
    async fn begin_session(
        &self,
        user_id: &UserId,
        session: &SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Replace `old` by `new` for `user_id`; `new` is live until `expires_at`.
    ///
    /// Must be atomic per user: of two calls presenting the same `old`, at
    /// most one returns [`RotationOutcome::Rotated`]. An expired `old` is a
    /// conflict.
    async fn record_refresh_rotation(
        &self,
        user_id: &UserId,
        old: &SessionId,
        new: &SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<RotationOutcome>;

    /// Forget a refresh generation; unknown sessions are ignored
    async fn end_session(&self, user_id: &UserId, session: &SessionId) -> Result<()>;
}
