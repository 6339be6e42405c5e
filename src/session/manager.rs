//! Session lifecycle: login, refresh rotation, logout and revocation
//!
//! Every login starts a session generation named by the refresh token's
//! `jti`. A refresh validates the presented token, signs a new pair, and
//! hands it out only once the store has swapped the old generation for the
//! new one. A store that reports the generation as already superseded turns
//! the call into [`AccessError::RefreshConflict`]; the caller must log in
//! again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::auth::{Argon2Verifier, Claims, CredentialVerifier, Principal, TokenIssuer, TokenKind};
use crate::config::AuthConfig;
use crate::session::cookie::{CookiePolicy, RefreshCookie};
use crate::store::{CredentialStore, RotationOutcome};
use crate::types::{AccessError, Result, SessionId, UserId};

/// JSON body handed to the client; the refresh token is never part of it
#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub access_token: String,
    pub token_type: &'static str,
    /// Seconds until the access token expires
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a login or refresh
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub grant: AccessGrant,
    /// When the refresh token, and with it this session generation, lapses
    pub refresh_expires_at: DateTime<Utc>,
    /// Must be sent as `Set-Cookie`
    pub refresh_cookie: RefreshCookie,
}

/// Checked against when the email is unknown, so both rejections cost one hash
const UNKNOWN_ACCOUNT_PASSWORD: &str = "konbini-unknown-account";

pub struct SessionManager {
    issuer: TokenIssuer,
    store: Arc<dyn CredentialStore>,
    verifier: Arc<dyn CredentialVerifier>,
    cookies: CookiePolicy,
    /// Hash of [`UNKNOWN_ACCOUNT_PASSWORD`] in the verifier's own format
    decoy_hash: Arc<OnceLock<String>>,
}

impl SessionManager {
    pub fn new(
        issuer: TokenIssuer,
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn CredentialVerifier>,
        cookies: CookiePolicy,
    ) -> Self {
        Self {
            issuer,
            store,
            verifier,
            cookies,
            decoy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Manager with Argon2id verification and the configured cookie policy
    pub fn from_config(config: &AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Ok(Self::new(
            TokenIssuer::from_config(config)?,
            store,
            Arc::new(Argon2Verifier),
            CookiePolicy::from_config(config),
        ))
    }

    pub fn cookie_policy(&self) -> &CookiePolicy {
        &self.cookies
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Start a new session for an already authenticated user
    pub async fn login(&self, user_id: UserId) -> Result<IssuedSession> {
        let session_id = SessionId::generate();
        let issued = self.sign_pair(user_id, session_id)?;
        self.store
            .begin_session(&user_id, &session_id, issued.refresh_expires_at)
            .await?;

        info!("Session {} started for {}", session_id, user_id);
        Ok(issued)
    }

    /// Check an email and password, then log the account in.
    ///
    /// Unknown email and wrong password both yield
    /// [`AccessError::CredentialMismatch`].
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<IssuedSession> {
        let Some(record) = self.store.load_password_hash(email).await? else {
            self.verify_blocking(password, None).await?;
            warn!("Login rejected: unknown account");
            return Err(AccessError::CredentialMismatch);
        };

        let matched = self
            .verify_blocking(password, Some(record.password_hash))
            .await?;

        if !matched {
            warn!("Login rejected for {}: wrong password", record.user_id);
            return Err(AccessError::CredentialMismatch);
        }

        self.login(record.user_id).await
    }

    /// Run the verifier off the async runtime.
    ///
    /// With no stored hash the password is checked against the decoy hash and
    /// the outcome discarded.
    async fn verify_blocking(&self, password: &str, hash: Option<String>) -> Result<bool> {
        let verifier = Arc::clone(&self.verifier);
        let decoy = Arc::clone(&self.decoy_hash);
        let password = password.to_string();

        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => verifier.verify(&password, &hash),
            None => {
                let decoy = decoy.get_or_init(|| {
                    verifier
                        .hash(UNKNOWN_ACCOUNT_PASSWORD)
                        .unwrap_or_default()
                });
                let _ = verifier.verify(&password, decoy);
                Ok(false)
            }
        })
        .await
        .map_err(|e| AccessError::Hashing(format!("verification task failed: {e}")))?
    }

    /// Rotate a refresh token into a new access and refresh pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession> {
        let claims = self.issuer.validate(refresh_token, TokenKind::Refresh)?;
        let next = SessionId::generate();
        let issued = self.sign_pair(claims.sub, next)?;

        match self
            .store
            .record_refresh_rotation(&claims.sub, &claims.jti, &next, issued.refresh_expires_at)
            .await?
        {
            RotationOutcome::Rotated => {
                debug!("Session {} rotated to {} for {}", claims.jti, next, claims.sub);
                Ok(issued)
            }
            RotationOutcome::Conflict => {
                warn!(
                    "Refresh token reuse for {}: session {} already superseded",
                    claims.sub, claims.jti
                );
                Err(AccessError::RefreshConflict)
            }
        }
    }

    /// Cookie that makes the browser stop sending the refresh token
    pub fn logout(&self) -> RefreshCookie {
        RefreshCookie::cleared(&self.cookies)
    }

    /// End the session behind `refresh_token` in the store and clear the cookie
    pub async fn revoke(&self, refresh_token: &str) -> Result<RefreshCookie> {
        let claims = self.issuer.validate(refresh_token, TokenKind::Refresh)?;
        self.store.end_session(&claims.sub, &claims.jti).await?;

        info!("Session {} revoked for {}", claims.jti, claims.sub);
        Ok(self.logout())
    }

    /// Validate an access token
    pub fn verify_access(&self, access_token: &str) -> Result<Claims> {
        self.issuer.validate(access_token, TokenKind::Access)
    }

    /// Validate an access token and read its subject's current grants
    pub async fn load_principal(&self, access_token: &str) -> Result<Principal> {
        let claims = self.verify_access(access_token)?;
        self.store.load_principal(&claims.sub).await
    }

    fn sign_pair(&self, user_id: UserId, session_id: SessionId) -> Result<IssuedSession> {
        let access = self.issuer.issue(user_id, TokenKind::Access, session_id)?;
        let refresh = self.issuer.issue(user_id, TokenKind::Refresh, session_id)?;

        let grant = AccessGrant {
            expires_in: access.claims.exp.saturating_sub(access.claims.iat),
            expires_at: access.claims.expires_at(),
            access_token: access.token,
            token_type: "Bearer",
        };

        Ok(IssuedSession {
            user_id,
            session_id,
            grant,
            refresh_expires_at: refresh.claims.expires_at(),
            refresh_cookie: RefreshCookie::issue(refresh.token, &self.cookies),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, PermissionSet};
    use crate::config::{SameSite, SigningSecret};
    use crate::store::{CredentialRecord, MemoryStore};
    use crate::types::{TokenRejection, VaultId};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn issuer(refresh_ttl: Duration) -> TokenIssuer {
        TokenIssuer::new(
            "konbini-test",
            SigningSecret::new(b"access-secret-that-is-at-least-32-bytes".to_vec()),
            SigningSecret::new(b"refresh-secret-that-is-at-least-32-bytes".to_vec()),
            Duration::minutes(15),
            refresh_ttl,
        )
        .unwrap()
    }

    fn policy() -> CookiePolicy {
        CookiePolicy {
            domain: None,
            secure: true,
            same_site: SameSite::Strict,
            max_age: Duration::days(7),
        }
    }

    fn manager(store: Arc<dyn CredentialStore>) -> SessionManager {
        SessionManager::new(issuer(Duration::days(7)), store, Arc::new(Argon2Verifier), policy())
    }

    /// Rotates once, then reports every later rotation as superseded
    #[derive(Default)]
    struct ConflictOnSecondStore {
        rotations: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for ConflictOnSecondStore {
        async fn load_principal(&self, user_id: &UserId) -> Result<Principal> {
            Ok(Principal::new(*user_id))
        }

        async fn load_password_hash(&self, _email: &str) -> Result<Option<CredentialRecord>> {
            Ok(None)
        }

        async fn begin_session(
            &self,
            _user_id: &UserId,
            _session: &SessionId,
            _expires_at: DateTime<Utc>,
        ) -> Result<()> {
            Ok(())
        }

        async fn record_refresh_rotation(
            &self,
            _user_id: &UserId,
            _old: &SessionId,
            _new: &SessionId,
            _expires_at: DateTime<Utc>,
        ) -> Result<RotationOutcome> {
            match self.rotations.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(RotationOutcome::Rotated),
                _ => Ok(RotationOutcome::Conflict),
            }
        }

        async fn end_session(&self, _user_id: &UserId, _session: &SessionId) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_login_issues_pair() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone());
        let user = UserId::generate();

        let issued = sessions.login(user).await.unwrap();
        assert_eq!(issued.grant.token_type, "Bearer");
        assert_eq!(issued.grant.expires_in, 15 * 60);
        assert_eq!(issued.refresh_cookie.max_age, 604_800);
        assert!(issued.refresh_cookie.http_only);
        assert_eq!(store.active_sessions(&user), 1);

        let claims = sessions.verify_access(&issued.grant.access_token).unwrap();
        assert_eq!(claims.sub, user);

        let body = serde_json::to_value(&issued.grant).unwrap();
        assert!(body.get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let sessions = manager(Arc::new(MemoryStore::new()));
        let issued = sessions.login(UserId::generate()).await.unwrap();

        assert!(matches!(
            sessions.verify_access(&issued.refresh_cookie.value),
            Err(AccessError::TokenInvalid(_))
        ));
        assert!(matches!(
            sessions.refresh(&issued.grant.access_token).await,
            Err(AccessError::TokenInvalid(TokenRejection::SignatureInvalid))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rotates() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone());
        let user = UserId::generate();

        let first = sessions.login(user).await.unwrap();
        let second = sessions.refresh(&first.refresh_cookie.value).await.unwrap();
        assert_eq!(second.user_id, user);
        assert_ne!(second.session_id, first.session_id);
        assert_ne!(second.refresh_cookie.value, first.refresh_cookie.value);

        // The superseded token is dead; the new one keeps working.
        assert!(matches!(
            sessions.refresh(&first.refresh_cookie.value).await,
            Err(AccessError::RefreshConflict)
        ));
        assert!(sessions.refresh(&second.refresh_cookie.value).await.is_ok());
        assert_eq!(store.active_sessions(&user), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_against_conflicting_store() {
        let sessions = manager(Arc::new(ConflictOnSecondStore::default()));
        let issued = sessions.login(UserId::generate()).await.unwrap();
        let token = issued.refresh_cookie.value.as_str();

        let (a, b) = tokio::join!(sessions.refresh(token), sessions.refresh(token));
        let outcomes = [a, b];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(AccessError::RefreshConflict)))
                .count(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_refresh_single_winner() {
        let sessions = Arc::new(manager(Arc::new(MemoryStore::new())));
        let issued = sessions.login(UserId::generate()).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let sessions = Arc::clone(&sessions);
                let token = issued.refresh_cookie.value.clone();
                tokio::spawn(async move { sessions.refresh(&token).await })
            })
            .collect();

        let mut won = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => won += 1,
                Err(e) => assert!(matches!(e, AccessError::RefreshConflict)),
            }
        }
        assert_eq!(won, 1);
    }

    #[tokio::test]
    async fn test_expired_refresh() {
        let sessions = SessionManager::new(
            issuer(Duration::seconds(-1)),
            Arc::new(MemoryStore::new()),
            Arc::new(Argon2Verifier),
            policy(),
        );
        let issued = sessions.login(UserId::generate()).await.unwrap();
        assert!(matches!(
            sessions.refresh(&issued.refresh_cookie.value).await,
            Err(AccessError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user("ada@example.com", hash_password("correct horse").unwrap())
            .unwrap();
        let sessions = manager(store);

        let issued = sessions.authenticate("ada@example.com", "correct horse").await.unwrap();
        assert_eq!(issued.user_id, user);

        assert!(matches!(
            sessions.authenticate("ada@example.com", "wrong").await,
            Err(AccessError::CredentialMismatch)
        ));
        assert!(matches!(
            sessions.authenticate("nobody@example.com", "correct horse").await,
            Err(AccessError::CredentialMismatch)
        ));
    }

    /// Argon2 underneath, counting every verification
    #[derive(Default)]
    struct CountingVerifier {
        verifications: AtomicUsize,
    }

    impl CredentialVerifier for CountingVerifier {
        fn hash(&self, password: &str) -> Result<String> {
            Argon2Verifier.hash(password)
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            Argon2Verifier.verify(password, hash)
        }
    }

    #[tokio::test]
    async fn test_unknown_email_costs_a_verification() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user("ada@example.com", hash_password("correct horse").unwrap())
            .unwrap();
        let verifier = Arc::new(CountingVerifier::default());
        let sessions = SessionManager::new(
            issuer(Duration::days(7)),
            store,
            verifier.clone(),
            policy(),
        );

        assert!(matches!(
            sessions.authenticate("ada@example.com", "wrong").await,
            Err(AccessError::CredentialMismatch)
        ));
        assert_eq!(verifier.verifications.load(Ordering::SeqCst), 1);

        for attempt in 1..=2 {
            assert!(matches!(
                sessions.authenticate("nobody@example.com", "correct horse").await,
                Err(AccessError::CredentialMismatch)
            ));
            assert_eq!(verifier.verifications.load(Ordering::SeqCst), 1 + attempt);
        }

        // The decoy never admits anyone, even with the decoy's own password.
        assert!(matches!(
            sessions
                .authenticate("nobody@example.com", UNKNOWN_ACCOUNT_PASSWORD)
                .await,
            Err(AccessError::CredentialMismatch)
        ));
    }

    #[tokio::test]
    async fn test_logout_and_revoke() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(store.clone());
        let user = UserId::generate();

        assert!(sessions.logout().is_cleared());

        let issued = sessions.login(user).await.unwrap();
        let cookie = sessions.revoke(&issued.refresh_cookie.value).await.unwrap();
        assert!(cookie.is_cleared());
        assert_eq!(store.active_sessions(&user), 0);
        assert!(matches!(
            sessions.refresh(&issued.refresh_cookie.value).await,
            Err(AccessError::RefreshConflict)
        ));
    }

    #[tokio::test]
    async fn test_principal_is_read_per_request() {
        let store = Arc::new(MemoryStore::new());
        let user = store.insert_user("grace@example.com", "unused".into()).unwrap();
        let vault = VaultId::generate();
        let sessions = manager(store.clone());
        let token = sessions.login(user).await.unwrap().grant.access_token;

        store.set_vault_permissions(user, vault, PermissionSet::VAULT_EDITOR_PRESET);
        let before = sessions.load_principal(&token).await.unwrap();

        store.set_vault_permissions(user, vault, PermissionSet::VAULT_READ_ONLY_PRESET);
        let after = sessions.load_principal(&token).await.unwrap();

        assert_eq!(before.vault_permissions[&vault], PermissionSet::VAULT_EDITOR_PRESET);
        assert_eq!(after.vault_permissions[&vault], PermissionSet::VAULT_READ_ONLY_PRESET);
    }
}
