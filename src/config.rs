//! Configuration for the access core
//!
//! [`AuthConfig`] is built by one constructor, [`AuthConfig::from_args`],
//! which lists every recognized option and its default, then validates the
//! result. [`AuthArgs`] reads the raw values from CLI flags or environment
//! variables using clap.

use chrono::Duration;
use clap::{Parser, ValueEnum};
use rand::RngCore;
use std::fmt;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::jwt::MIN_SECRET_LEN;
use crate::types::{AccessError, Result};

/// Default `iss` claim
pub const DEFAULT_ISSUER: &str = "konbini";

/// Default access token lifetime (15 minutes)
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Default refresh token lifetime (7 days)
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Cookie `SameSite` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SameSite {
    Strict,
    Lax,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
        }
    }
}

/// HMAC signing key material, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// 32 random bytes, hex encoded, from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let secret = Self(hex::encode(bytes).into_bytes());
        bytes.zeroize();
        secret
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SigningSecret {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl PartialEq for SigningSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SigningSecret {}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret([REDACTED; {}])", self.0.len())
    }
}

/// Raw configuration values from flags or environment
#[derive(Parser, Debug, Clone, Default)]
pub struct AuthArgs {
    /// Runtime environment; production enforces strict cookie flags
    #[arg(long = "env", env = "KONBINI_ENV", value_enum)]
    pub environment: Option<Environment>,

    /// Issuer written to and required in the `iss` claim
    #[arg(long, env = "TOKEN_ISSUER")]
    pub issuer: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS")]
    pub access_ttl_secs: Option<i64>,

    /// Refresh token lifetime in seconds (also the cookie Max-Age)
    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS")]
    pub refresh_ttl_secs: Option<i64>,

    /// Secret for signing access tokens (required in production)
    #[arg(long, env = "ACCESS_TOKEN_SECRET", hide_env_values = true)]
    pub access_secret: Option<String>,

    /// Secret for signing refresh tokens (required in production)
    #[arg(long, env = "REFRESH_TOKEN_SECRET", hide_env_values = true)]
    pub refresh_secret: Option<String>,

    /// Domain attribute of the refresh cookie (host-only when unset)
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Secure attribute of the refresh cookie
    #[arg(long, env = "COOKIE_SECURE")]
    pub cookie_secure: Option<bool>,

    /// SameSite attribute of the refresh cookie
    #[arg(long, env = "COOKIE_SAME_SITE", value_enum)]
    pub cookie_same_site: Option<SameSite>,
}

/// Validated configuration consumed by the token issuer and session manager
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub access_secret: SigningSecret,
    pub refresh_secret: SigningSecret,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
}

impl AuthConfig {
    /// Build and validate configuration.
    ///
    /// Defaults: development environment, issuer [`DEFAULT_ISSUER`], 15 minute
    /// access tokens, 7 day refresh tokens, no cookie domain. Cookies are
    /// `Secure` + `SameSite=Strict` in production and `Lax` without `Secure`
    /// in development. Development without secrets gets random per-process
    /// secrets; production without them is an error.
    pub fn from_args(args: AuthArgs) -> Result<Self> {
        let environment = args.environment.unwrap_or_default();
        let production = environment.is_production();

        let access_secret = Self::secret_or_generate(args.access_secret, "ACCESS_TOKEN_SECRET", environment)?;
        let refresh_secret = Self::secret_or_generate(args.refresh_secret, "REFRESH_TOKEN_SECRET", environment)?;

        let access_ttl = Self::ttl(
            args.access_ttl_secs.unwrap_or(DEFAULT_ACCESS_TTL_SECS),
            "ACCESS_TOKEN_TTL_SECS",
        )?;
        let refresh_ttl = Self::ttl(
            args.refresh_ttl_secs.unwrap_or(DEFAULT_REFRESH_TTL_SECS),
            "REFRESH_TOKEN_TTL_SECS",
        )?;

        let config = Self {
            environment,
            issuer: args.issuer.unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            access_ttl,
            refresh_ttl,
            access_secret,
            refresh_secret,
            cookie_domain: args.cookie_domain.filter(|d| !d.trim().is_empty()),
            cookie_secure: args.cookie_secure.unwrap_or(production),
            cookie_same_site: args.cookie_same_site.unwrap_or(if production {
                SameSite::Strict
            } else {
                SameSite::Lax
            }),
        };

        config.validate()?;
        Ok(config)
    }

    /// Development configuration with generated secrets
    pub fn development() -> Result<Self> {
        Self::from_args(AuthArgs::default())
    }

    fn ttl(secs: i64, name: &str) -> Result<Duration> {
        Duration::try_seconds(secs)
            .ok_or_else(|| AccessError::Config(format!("{name} is out of range: {secs}")))
    }

    fn secret_or_generate(
        value: Option<String>,
        name: &str,
        environment: Environment,
    ) -> Result<SigningSecret> {
        match value {
            Some(secret) if !secret.is_empty() => Ok(SigningSecret::from(secret)),
            _ if environment.is_production() => Err(AccessError::Config(format!(
                "{name} is required in production mode"
            ))),
            _ => {
                warn!("{name} not set, using a random secret; tokens will not survive a restart");
                Ok(SigningSecret::generate())
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            return Err(AccessError::Config("issuer must not be empty".into()));
        }

        if self.access_ttl <= Duration::zero() || self.refresh_ttl <= Duration::zero() {
            return Err(AccessError::Config("token lifetimes must be positive".into()));
        }

        if self.access_ttl >= self.refresh_ttl {
            return Err(AccessError::Config(
                "access token lifetime must be shorter than refresh token lifetime".into(),
            ));
        }

        for (name, secret) in [
            ("ACCESS_TOKEN_SECRET", &self.access_secret),
            ("REFRESH_TOKEN_SECRET", &self.refresh_secret),
        ] {
            if secret.len() < MIN_SECRET_LEN {
                return Err(AccessError::Config(format!(
                    "{name} must be at least {MIN_SECRET_LEN} characters"
                )));
            }
        }

        if self.access_secret == self.refresh_secret {
            return Err(AccessError::Config(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ".into(),
            ));
        }

        if self.environment.is_production() {
            if !self.cookie_secure {
                return Err(AccessError::Config(
                    "COOKIE_SECURE cannot be disabled in production".into(),
                ));
            }
            if self.cookie_same_site != SameSite::Strict {
                return Err(AccessError::Config(
                    "COOKIE_SAME_SITE must be Strict in production".into(),
                ));
            }
        }

        Ok(())
    }
}
