//! Authentication and authorization for the vault service
//!
//! Provides:
//! - Scope-tagged permission sets and the ownership transfer path
//! - Access and refresh token issuing and validation
//! - Password hashing with Argon2
//! - The authorization evaluator every vault or team mutation passes through

pub mod evaluator;
pub mod jwt;
pub mod password;
pub mod permissions;

pub use evaluator::{
    authorize, authorize_add_vault_to_team, can_add_vault_to_team, delegate_grant, delegate_revoke,
    evaluate, Decision, Principal, ScopeId,
};
pub use jwt::{
    bearer_token, issue_token, validate_token, Claims, SignedToken, TokenIssuer, TokenKind,
    CLOCK_SKEW_LEEWAY_SECS, SIGNING_ALGORITHM,
};
pub use password::{hash_password, verify_password, Argon2Verifier, CredentialVerifier, MAX_PASSWORD_LEN};
pub use permissions::{transfer_ownership, PermissionSet, Scope};
