//! Credential selection
//!
//! Decides which identity an outbound call is made with:
//!
//! | Caller token | Dev login configured | Result                                 |
//! |--------------|----------------------|----------------------------------------|
//! | yes          | -                    | `Caller`, service key never attached   |
//! | no           | yes                  | `DevSession`, cached until near expiry |
//! | no           | no                   | `ServiceRole`                          |

use chrono::{DateTime, Duration, Utc};
use hyper::HeaderMap;
use std::future::Future;
use tokio::sync::Mutex;

use super::error::GatewayResult;

/// Tokens are refreshed this long before they actually expire
const EXPIRY_SKEW_SECS: i64 = 30;

/// Lifetime assumed when the auth endpoint omits `expires_in`
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Longest lifetime accepted from the auth endpoint
pub const MAX_TOKEN_TTL_SECS: i64 = DEFAULT_TOKEN_TTL_SECS * 24;

/// Identity used for one outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bearer token supplied by the caller
    Caller(String),
    /// Token obtained with the configured dev email/password
    DevSession(String),
    /// Privileged service-role key
    ServiceRole(String),
}

impl Credential {
    pub fn bearer(&self) -> &str {
        match self {
            Self::Caller(t) | Self::DevSession(t) | Self::ServiceRole(t) => t,
        }
    }

    /// Value for the `apikey` header.
    ///
    /// Caller tokens only ever travel with the anon key. Dev sessions prefer
    /// the anon key and fall back to the service key.
    pub fn api_key<'a>(
        &'a self,
        anon_key: Option<&'a str>,
        service_key: Option<&'a str>,
    ) -> Option<&'a str> {
        match self {
            Self::Caller(_) => anon_key,
            Self::DevSession(_) => anon_key.or(service_key),
            Self::ServiceRole(key) => Some(key),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Caller(_) => "caller",
            Self::DevSession(_) => "dev_session",
            Self::ServiceRole(_) => "service_role",
        }
    }
}

/// Strip an optional `Bearer` scheme and surrounding whitespace.
///
/// Returns `None` when nothing is left.
pub fn normalize_bearer(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let token = match trimmed.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if trimmed.eq_ignore_ascii_case("bearer") => "",
        _ => trimmed,
    };
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Caller token from `Authorization`, falling back to `X-Access-Token`
pub fn caller_token(headers: &HeaderMap) -> Option<String> {
    ["authorization", "x-access-token"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .find_map(normalize_bearer)
}

/// Dev session token with its expiry
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// `expires_in_secs` comes from the auth server and is clamped to
    /// `0..=MAX_TOKEN_TTL_SECS`
    pub fn new(access_token: String, expires_in_secs: Option<i64>, now: DateTime<Utc>) -> Self {
        let ttl = expires_in_secs
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS)
            .clamp(0, MAX_TOKEN_TTL_SECS);
        let expires_at = Duration::try_seconds(ttl)
            .and_then(|delta| now.checked_add_signed(delta))
            .or_else(|| {
                Duration::try_seconds(DEFAULT_TOKEN_TTL_SECS)
                    .and_then(|delta| now.checked_add_signed(delta))
            })
            .unwrap_or(now);
        Self {
            access_token,
            expires_at,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now.checked_add_signed(Duration::seconds(EXPIRY_SKEW_SECS))
            .is_some_and(|refresh_at| refresh_at < self.expires_at)
    }
}

/// Single-slot cache for the dev session token
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, or run `refresh` and cache its result.
    ///
    /// The lock is held across `refresh`, so concurrent callers wait for a
    /// single login.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> GatewayResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<CachedToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|t| t.is_fresh_at(Utc::now())) {
            return Ok(cached.access_token.clone());
        }

        let fresh = refresh().await?;
        let token = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(token)
    }

    #[cfg(test)]
    pub async fn store(&self, token: CachedToken) {
        *self.slot.lock().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}
