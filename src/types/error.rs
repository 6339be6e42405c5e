//! Error types for the access core
//!
//! Every core operation returns [`AccessError`]. Mapping to a user-visible
//! status belongs to the transport edge; [`AccessError::status_code`] is the
//! default mapping that edge is expected to use.

use hyper::StatusCode;

use crate::auth::PermissionSet;
use crate::types::IdKind;

/// Why a presented token was refused (other than expiry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("malformed token")]
    Malformed,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("signing algorithm not accepted")]
    AlgorithmMismatch,

    #[error("issuer not accepted")]
    IssuerMismatch,

    #[error("expected {expected} token, got {found}")]
    KindMismatch {
        expected: crate::auth::TokenKind,
        found: crate::auth::TokenKind,
    },
}

/// Main error type for access core operations
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Malformed identifier: {0}")]
    MalformedId(String),

    #[error("Identifier kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: IdKind, found: IdKind },

    #[error("Illegal grant: role bits {bits} cannot be changed through grant or revoke")]
    IllegalGrant { bits: PermissionSet },

    #[error("Unauthorized: missing {missing}")]
    Unauthorized { missing: PermissionSet },

    #[error("Token expired")]
    TokenExpired,

    #[error("Token invalid: {0}")]
    TokenInvalid(TokenRejection),

    #[error("Refresh token already rotated")]
    RefreshConflict,

    #[error("Invalid credentials")]
    CredentialMismatch,

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AccessError {
    /// Default HTTP status for this error at the transport edge
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedId(_) => StatusCode::BAD_REQUEST,
            Self::KindMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::IllegalGrant { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            Self::RefreshConflict => StatusCode::UNAUTHORIZED,
            Self::CredentialMismatch => StatusCode::FORBIDDEN,
            Self::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller must sign in again rather than retry
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired | Self::TokenInvalid(_) | Self::RefreshConflict
        )
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<jsonwebtoken::errors::Error> for AccessError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidSignature => Self::TokenInvalid(TokenRejection::SignatureInvalid),
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::TokenInvalid(TokenRejection::AlgorithmMismatch)
            }
            ErrorKind::InvalidIssuer => Self::TokenInvalid(TokenRejection::IssuerMismatch),
            _ => Self::TokenInvalid(TokenRejection::Malformed),
        }
    }
}

impl From<argon2::password_hash::Error> for AccessError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Hashing(err.to_string())
    }
}

/// Result type alias for access core operations
pub type Result<T> = std::result::Result<T, AccessError>;
