//! Signed, client-held sessions.
//!
//! A token is `<base64url(JSON claims)>.<hex HMAC-SHA256 of the first part>`.
//! Nothing is kept server-side, so a token stays valid until it expires even
//! after the browser drops the cookie.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::store::{Role, UserRecord};

pub const SESSION_COOKIE: &str = "session";
/// One year.
pub const SESSION_MAX_AGE_SECS: i64 = 365 * 24 * 60 * 60;
/// Tolerated clock skew for tokens issued "in the future".
const FUTURE_SKEW_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

/// Snapshot of a user taken at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: i64,
}

impl From<&UserRecord> for SessionUser {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            created_at: u.created_at,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    #[serde(flatten)]
    user: SessionUser,
    issued_at: i64,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct SigningKey(Vec<u8>);

/// Issues and verifies session tokens and builds the matching cookies.
#[derive(Clone)]
pub struct SessionManager {
    key: Arc<SigningKey>,
    max_age_secs: i64,
}

impl SessionManager {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("session secret must not be empty");
        }
        Ok(Self {
            key: Arc::new(SigningKey(secret.to_vec())),
            max_age_secs: SESSION_MAX_AGE_SECS,
        })
    }

    #[cfg(test)]
    pub fn with_max_age(mut self, secs: i64) -> Self {
        self.max_age_secs = secs;
        self
    }

    pub fn create(&self, user: &SessionUser) -> Result<String> {
        self.create_at(user, now())
    }

    pub fn create_at(&self, user: &SessionUser, issued_at: i64) -> Result<String> {
        let claims = Claims {
            user: user.clone(),
            issued_at,
        };
        let json = serde_json::to_vec(&claims).context("serialize session")?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let tag = self.sign(&payload);
        Ok(format!("{payload}.{tag}"))
    }

    pub fn resolve(&self, token: &str) -> Option<SessionUser> {
        self.resolve_at(token, now())
    }

    /// Verify `token` as of `now`. Anything short of a well-formed, correctly
    /// signed, unexpired token resolves to `None`.
    pub fn resolve_at(&self, token: &str, now: i64) -> Option<SessionUser> {
        let (payload, tag) = token.split_once('.')?;
        let expected = self.sign(payload);
        if !constant_time_eq::constant_time_eq(expected.as_bytes(), tag.as_bytes()) {
            debug!("session tag mismatch");
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: Claims = serde_json::from_slice(&json).ok()?;
        if claims.issued_at > now + FUTURE_SKEW_SECS {
            debug!(user_id = claims.user.id, "session issued in the future");
            return None;
        }
        if now - claims.issued_at > self.max_age_secs {
            debug!(user_id = claims.user.id, "session expired");
            return None;
        }
        Some(claims.user)
    }

    /// Resolve the `session` cookie of an incoming request, if any.
    pub fn resolve_jar(&self, jar: &CookieJar) -> Option<SessionUser> {
        let cookie = jar.get(SESSION_COOKIE)?;
        if cookie.value().is_empty() {
            return None;
        }
        self.resolve(cookie.value())
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.max_age_secs))
            .build()
    }

    /// A cookie that makes the browser drop its session.
    pub fn invalidate(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::ZERO)
            .expires(time::OffsetDateTime::UNIX_EPOCH)
            .build()
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key.0).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
