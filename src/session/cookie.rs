//! Refresh token cookie
//!
//! The refresh token only ever travels in this cookie: name `refresh_token`,
//! path `/`, `HttpOnly`, with `Secure`/`SameSite` taken from configuration
//! and `Max-Age` equal to the refresh token lifetime.

use chrono::Duration;
use hyper::header::HeaderValue;
use std::fmt;

use crate::config::{AuthConfig, SameSite};
use crate::types::{AccessError, Result};

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/";

/// Cookie attributes shared by every refresh cookie the manager emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age: Duration,
}

impl CookiePolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            domain: config.cookie_domain.clone(),
            secure: config.cookie_secure,
            same_site: config.cookie_same_site,
            max_age: config.refresh_ttl,
        }
    }
}

/// A `Set-Cookie` instruction for the transport layer
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshCookie {
    pub value: String,
    pub path: &'static str,
    pub domain: Option<String>,
    /// Seconds; zero clears the cookie
    pub max_age: i64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl RefreshCookie {
    /// Cookie carrying a freshly issued refresh token
    pub fn issue(token: String, policy: &CookiePolicy) -> Self {
        Self {
            value: token,
            path: REFRESH_COOKIE_PATH,
            domain: policy.domain.clone(),
            max_age: policy.max_age.num_seconds().max(0),
            http_only: true,
            secure: policy.secure,
            same_site: policy.same_site,
        }
    }

    /// Empty cookie with `Max-Age=0` so the browser drops it
    pub fn cleared(policy: &CookiePolicy) -> Self {
        Self {
            value: String::new(),
            path: REFRESH_COOKIE_PATH,
            domain: policy.domain.clone(),
            max_age: 0,
            http_only: true,
            secure: policy.secure,
            same_site: policy.same_site,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.value.is_empty() && self.max_age <= 0
    }

    pub fn to_header_value(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.to_string())
            .map_err(|e| AccessError::Config(format!("refresh cookie is not a valid header: {e}")))
    }
}

impl fmt::Display for RefreshCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path={}; Max-Age={}",
            REFRESH_COOKIE_NAME, self.value, self.path, self.max_age
        )?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if self.http_only {
            write!(f, "; HttpOnly")?;
        }
        if self.secure {
            write!(f, "; Secure")?;
        }
        write!(f, "; SameSite={}", self.same_site)
    }
}

impl fmt::Debug for RefreshCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCookie")
            .field("value", &if self.value.is_empty() { "" } else { "[REDACTED]" })
            .field("path", &self.path)
            .field("domain", &self.domain)
            .field("max_age", &self.max_age)
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .field("same_site", &self.same_site)
            .finish()
    }
}

/// Find the refresh token in an inbound `Cookie` header
pub fn refresh_token_from_cookie_header(header: Option<&str>) -> Option<&str> {
    header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == REFRESH_COOKIE_NAME)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
