//! Konbini access core
//!
//! Identity, permission and session primitives for the Konbini secrets vault.
//!
//! ## Modules
//!
//! - **types**: typed identifiers (`user_…`, `vault_…`, `team_…`, `session_…`) and errors
//! - **auth**: permission sets, tokens, password hashing and the authorization evaluator
//! - **session**: login, refresh rotation, logout and the refresh cookie
//! - **store**: the credential store seam and an in-memory implementation
//! - **config**: validated configuration from flags and environment

pub mod auth;
pub mod config;
pub mod session;
pub mod store;
pub mod types;

pub use auth::{authorize, PermissionSet, Principal, Scope, ScopeId, TokenIssuer, TokenKind};
pub use config::{AuthArgs, AuthConfig};
pub use session::{AccessGrant, IssuedSession, RefreshCookie, SessionManager};
pub use store::{CredentialStore, MemoryStore};
pub use types::{AccessError, Result};
