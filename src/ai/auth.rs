//! API credential handling and bearer-token signing.
//!
//! The configured key has the form `<key_id>.<secret>`. Every request carries a
//! short-lived HS256 JWT signed with the secret:
//!
//! ```text
//! header:  {"alg":"HS256","sign_type":"SIGN"}
//! payload: {"api_key":"<key_id>","exp":<ms>,"timestamp":<ms>}
//! ```
//!
//! Tokens are cached and re-signed shortly before they expire.

use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;

use crate::constants::auth as auth_constants;
use crate::types::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Credential
// =============================================================================

/// Parsed API credential. The secret half never appears in Debug output.
#[derive(Clone)]
pub struct Credential {
    key_id: String,
    secret: SecretString,
}

impl Credential {
    /// Split `<key_id>.<secret>` on the first separator.
    ///
    /// A missing separator or an empty half is reported as `NotInitialized`.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GatewayError::not_initialized("API key is not configured"));
        }

        let Some((key_id, secret)) = raw.split_once(auth_constants::CREDENTIAL_SEPARATOR) else {
            return Err(GatewayError::not_initialized(
                "API key must have the form <key_id>.<secret>",
            ));
        };

        if key_id.is_empty() || secret.is_empty() {
            return Err(GatewayError::not_initialized(
                "API key has an empty key id or secret",
            ));
        }

        Ok(Self {
            key_id: key_id.to_string(),
            secret: SecretString::from(secret.to_string()),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a bearer token issued at `now` and valid for `ttl`
    pub fn sign_token(&self, now: DateTime<Utc>, ttl: Duration) -> GatewayResult<String> {
        let issued_ms = now.timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let header = TokenHeader {
            alg: "HS256",
            sign_type: "SIGN",
        };
        let claims = TokenClaims {
            api_key: &self.key_id,
            exp: issued_ms.saturating_add(ttl_ms),
            timestamp: issued_ms,
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);

        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| GatewayError::not_initialized(format!("Invalid signing key: {e}")))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
struct TokenHeader {
    alg: &'static str,
    sign_type: &'static str,
}

#[derive(Serialize)]
struct TokenClaims<'a> {
    api_key: &'a str,
    exp: i64,
    timestamp: i64,
}

fn encode_segment<T: Serialize>(value: &T) -> GatewayResult<String> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| GatewayError::not_initialized(format!("Token encoding failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

// =============================================================================
// Token Cache
// =============================================================================

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Hands out bearer tokens, re-signing when the cached one is close to expiry
#[derive(Debug)]
pub struct TokenProvider {
    credential: Credential,
    ttl: Duration,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(credential: Credential, ttl: Duration) -> Self {
        Self {
            credential,
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Current bearer token
    pub fn bearer(&self) -> GatewayResult<String> {
        self.bearer_at(Utc::now())
    }

    fn bearer_at(&self, now: DateTime<Utc>) -> GatewayResult<String> {
        let margin = TimeDelta::seconds(auth_constants::REFRESH_MARGIN_SECS);

        if let Some(cached) = self
            .cached
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            && now + margin < cached.expires_at
        {
            return Ok(cached.token.clone());
        }

        let token = self.credential.sign_token(now, self.ttl)?;
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });

        tracing::debug!(key_id = %self.credential.key_id, %expires_at, "Signed new bearer token");
        Ok(token)
    }
}
