//! Access and refresh token issuing and validation
//!
//! Tokens are compact JWTs signed with HS256. Security notes:
//! - The algorithm is pinned: a header naming anything but HS256 is rejected
//!   before claims are looked at, including `none`
//! - Access and refresh tokens are signed with separate secrets, and the
//!   `kind` claim is checked after signature verification regardless
//! - Expiry leeway is [`CLOCK_SKEW_LEEWAY_SECS`]

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::{AuthConfig, SigningSecret};
use crate::types::{AccessError, Result, SessionId, TokenRejection, UserId};

/// The only accepted signing algorithm
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Tolerated clock skew when checking `exp`, in seconds
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 0;

/// Minimum signing secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Which half of the token pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Payload carried by every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user
    pub sub: UserId,
    /// Access or refresh
    pub kind: TokenKind,
    /// Token identifier; for refresh tokens, the session generation
    pub jti: SessionId,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp as i64, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Seconds until expiry; negative once expired
    pub fn time_remaining(&self) -> i64 {
        self.exp as i64 - Utc::now().timestamp()
    }

    /// Check if a token is close to expiring
    pub fn is_expiring_soon(&self, threshold_seconds: u64) -> bool {
        self.time_remaining() < threshold_seconds as i64
    }
}

/// A freshly signed token and its claims
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

fn check_secret(secret: &[u8]) -> Result<()> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(AccessError::Config(format!(
            "signing secret must be at least {MIN_SECRET_LEN} bytes"
        )));
    }
    Ok(())
}

/// Sign a token of `kind` for `subject`, valid for `ttl` from now.
///
/// A negative `ttl` yields an already expired token.
pub fn issue_token(
    subject: UserId,
    kind: TokenKind,
    ttl: Duration,
    issuer: &str,
    token_id: SessionId,
    secret: &[u8],
) -> Result<SignedToken> {
    check_secret(secret)?;

    let now = Utc::now().timestamp();
    let exp = now.saturating_add(ttl.num_seconds()).max(0);

    let claims = Claims {
        sub: subject,
        kind,
        jti: token_id,
        iss: issuer.to_string(),
        iat: now.max(0) as u64,
        exp: exp as u64,
    };

    let token = encode(
        &Header::new(SIGNING_ALGORITHM),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AccessError::Config(format!("Failed to sign {kind} token: {e}")))?;

    Ok(SignedToken { token, claims })
}

/// Verify signature, algorithm, issuer, expiry and kind, in that order
pub fn validate_token(
    token: &str,
    expected_kind: TokenKind,
    issuer: &str,
    secret: &[u8],
) -> Result<Claims> {
    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.algorithms = vec![SIGNING_ALGORITHM];
    validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
    validation.set_issuer(&[issuer]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            debug!("{expected_kind} token rejected: {e}");
            AccessError::from(e)
        })?;

    if data.claims.kind != expected_kind {
        return Err(AccessError::TokenInvalid(TokenRejection::KindMismatch {
            expected: expected_kind,
            found: data.claims.kind,
        }));
    }

    Ok(data.claims)
}

/// Issues and validates both token kinds with per-kind secrets
#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    access_secret: SigningSecret,
    refresh_secret: SigningSecret,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer from explicit parts.
    ///
    /// Returns an error if a secret is too short or both secrets are equal.
    pub fn new(
        issuer: impl Into<String>,
        access_secret: SigningSecret,
        refresh_secret: SigningSecret,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self> {
        check_secret(access_secret.expose())?;
        check_secret(refresh_secret.expose())?;
        if access_secret == refresh_secret {
            return Err(AccessError::Config(
                "access and refresh tokens must use different secrets".into(),
            ));
        }

        Ok(Self {
            issuer: issuer.into(),
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(
            config.issuer.clone(),
            config.access_secret.clone(),
            config.refresh_secret.clone(),
            config.access_ttl,
            config.refresh_ttl,
        )
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.access_secret.expose(),
            TokenKind::Refresh => self.refresh_secret.expose(),
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign a token of `kind` with that kind's secret and lifetime
    pub fn issue(&self, subject: UserId, kind: TokenKind, token_id: SessionId) -> Result<SignedToken> {
        issue_token(
            subject,
            kind,
            self.ttl(kind),
            &self.issuer,
            token_id,
            self.secret(kind),
        )
    }

    /// Validate a token that must be of `kind`
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        validate_token(token, kind, &self.issuer, self.secret(kind))
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn bearer_token(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-that-is-at-least-32-characters-long";
    const OTHER_SECRET: &[u8] = b"different-secret-that-is-at-least-32-characters";
    const ISSUER: &str = "konbini-test";

    fn mint(kind: TokenKind, ttl: Duration) -> SignedToken {
        issue_token(
            UserId::generate(),
            kind,
            ttl,
            ISSUER,
            SessionId::generate(),
            SECRET,
        )
        .unwrap()
    }

    fn test_issuer() -> TokenIssuer {
        TokenIssuer::new(
            ISSUER,
            SigningSecret::new(SECRET.to_vec()),
            SigningSecret::new(OTHER_SECRET.to_vec()),
            Duration::minutes(15),
            Duration::days(7),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_validate() {
        let subject = UserId::generate();
        let signed = issue_token(
            subject,
            TokenKind::Access,
            Duration::minutes(10),
            ISSUER,
            SessionId::generate(),
            SECRET,
        )
        .unwrap();
        assert!(!signed.token.is_empty());

        let claims = validate_token(&signed.token, TokenKind::Access, ISSUER, SECRET).unwrap();
        assert_eq!(claims.sub, subject);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, 600);
        assert_eq!(claims, signed.claims);
    }

    #[test]
    fn test_kind_mismatch_with_shared_secret() {
        let access = mint(TokenKind::Access, Duration::minutes(10));
        let err = validate_token(&access.token, TokenKind::Refresh, ISSUER, SECRET).unwrap_err();
        assert!(matches!(
            err,
            AccessError::TokenInvalid(TokenRejection::KindMismatch {
                expected: TokenKind::Refresh,
                found: TokenKind::Access,
            })
        ));

        let refresh = mint(TokenKind::Refresh, Duration::days(1));
        let err = validate_token(&refresh.token, TokenKind::Access, ISSUER, SECRET).unwrap_err();
        assert!(matches!(
            err,
            AccessError::TokenInvalid(TokenRejection::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_expired_token() {
        let expired = mint(TokenKind::Access, Duration::seconds(-1));
        let err = validate_token(&expired.token, TokenKind::Access, ISSUER, SECRET).unwrap_err();
        assert!(matches!(err, AccessError::TokenExpired));
    }

    fn sign_with_exp(exp: i64) -> String {
        let claims = Claims {
            exp: exp as u64,
            ..mint(TokenKind::Access, Duration::minutes(10)).claims
        };
        encode(&Header::new(SIGNING_ALGORITHM), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    #[test]
    fn test_zero_leeway_boundary() {
        assert_eq!(CLOCK_SKEW_LEEWAY_SECS, 0);

        // exp == now is still valid; retry if the second ticks over mid-check.
        let accepted = (0..5).any(|_| {
            let now = Utc::now().timestamp();
            let result = validate_token(&sign_with_exp(now), TokenKind::Access, ISSUER, SECRET);
            if Utc::now().timestamp() != now {
                return false;
            }
            assert!(result.is_ok(), "exp == now rejected: {result:?}");
            true
        });
        assert!(accepted);

        let lapsed = sign_with_exp(Utc::now().timestamp() - 1);
        assert!(matches!(
            validate_token(&lapsed, TokenKind::Access, ISSUER, SECRET),
            Err(AccessError::TokenExpired)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let token = mint(TokenKind::Access, Duration::minutes(10));
        let err = validate_token(&token.token, TokenKind::Access, ISSUER, OTHER_SECRET).unwrap_err();
        assert!(matches!(
            err,
            AccessError::TokenInvalid(TokenRejection::SignatureInvalid)
        ));
    }

    #[test]
    fn test_wrong_issuer() {
        let token = mint(TokenKind::Access, Duration::minutes(10));
        let err = validate_token(&token.token, TokenKind::Access, "someone-else", SECRET).unwrap_err();
        assert!(matches!(
            err,
            AccessError::TokenInvalid(TokenRejection::IssuerMismatch)
        ));
    }

    #[test]
    fn test_algorithm_pinned() {
        let claims = mint(TokenKind::Access, Duration::minutes(10)).claims;
        let hs384 = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        let err = validate_token(&hs384, TokenKind::Access, ISSUER, SECRET).unwrap_err();
        assert!(matches!(
            err,
            AccessError::TokenInvalid(TokenRejection::AlgorithmMismatch)
        ));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        // {"alg":"none","typ":"JWT"} . {} . <no signature>
        let forged = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.e30.";
        let err = validate_token(forged, TokenKind::Access, ISSUER, SECRET).unwrap_err();
        assert!(matches!(err, AccessError::TokenInvalid(_)));
    }

    #[test]
    fn test_garbage_token() {
        let err = validate_token("invalid-token", TokenKind::Access, ISSUER, SECRET).unwrap_err();
        assert!(matches!(
            err,
            AccessError::TokenInvalid(TokenRejection::Malformed)
        ));
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = issue_token(
            UserId::generate(),
            TokenKind::Access,
            Duration::minutes(1),
            ISSUER,
            SessionId::generate(),
            b"short",
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Config(_)));
    }

    #[test]
    fn test_issuer_separates_keys() {
        let issuer = test_issuer();
        let subject = UserId::generate();

        let access = issuer
            .issue(subject, TokenKind::Access, SessionId::generate())
            .unwrap();
        let refresh = issuer
            .issue(subject, TokenKind::Refresh, SessionId::generate())
            .unwrap();

        assert_eq!(issuer.validate(&access.token, TokenKind::Access).unwrap().sub, subject);
        assert_eq!(issuer.validate(&refresh.token, TokenKind::Refresh).unwrap().sub, subject);

        // Wrong key for the kind fails on the signature before kind is checked.
        assert!(matches!(
            issuer.validate(&access.token, TokenKind::Refresh),
            Err(AccessError::TokenInvalid(TokenRejection::SignatureInvalid))
        ));
        assert!(refresh.claims.exp - refresh.claims.iat == 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_issuer_rejects_shared_secret() {
        let err = TokenIssuer::new(
            ISSUER,
            SigningSecret::new(SECRET.to_vec()),
            SigningSecret::new(SECRET.to_vec()),
            Duration::minutes(15),
            Duration::days(7),
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Config(_)));
    }

    #[test]
    fn test_expiring_soon() {
        let token = mint(TokenKind::Access, Duration::seconds(30));
        assert!(token.claims.is_expiring_soon(60));
        assert!(!token.claims.is_expiring_soon(5));
        assert!(token.claims.time_remaining() <= 30);
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token(Some("abc123")), Some("abc123"));
        assert_eq!(bearer_token(None), None);
        assert_eq!(bearer_token(Some("")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc123")), None);
    }
}
