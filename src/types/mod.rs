//! Shared types: errors and typed identifiers

pub mod error;
pub mod id;

pub use error::{AccessError, Result, TokenRejection};
pub use id::{AnyId, IdKind, SessionId, TeamId, TypedId, UserId, VaultId};
