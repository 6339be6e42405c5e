//! Password hashing and verification using Argon2
//!
//! Uses the argon2id variant with the crate's recommended parameters. The
//! hash string is PHC formatted and carries its own salt and parameters.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::{AccessError, Result};

/// Longest accepted password, in bytes
pub const MAX_PASSWORD_LEN: usize = 256;

/// One-way password hashing capability
pub trait CredentialVerifier: Send + Sync {
    /// Hash `password` with a fresh random salt
    fn hash(&self, password: &str) -> Result<String>;

    /// `Ok(false)` on mismatch; errors only for an unparseable hash
    fn verify(&self, password: &str, hash: &str) -> Result<bool>;
}

/// Argon2id implementation of [`CredentialVerifier`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, password: &str) -> Result<String> {
        hash_password(password)
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        verify_password(password, hash)
    }
}

/// Hash a password using Argon2id
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(AccessError::Hashing("password must not be empty".into()));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AccessError::Hashing(format!(
            "password longer than {MAX_PASSWORD_LEN} bytes"
        )));
    }

    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccessError::Hashing(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
///
/// The digest comparison inside `argon2` is constant time.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AccessError::Hashing(format!("Invalid password hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
