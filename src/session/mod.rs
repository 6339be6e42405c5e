//! Session lifecycle and the refresh cookie contract

pub mod cookie;
pub mod manager;

pub use cookie::{refresh_token_from_cookie_header, CookiePolicy, RefreshCookie, REFRESH_COOKIE_NAME};
pub use manager::{AccessGrant, IssuedSession, SessionManager};
