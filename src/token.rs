//! Session token issuance and validation.
//!
//! Tokens are HS256 JWTs carrying `sub` (the principal id as a decimal string)
//! and `exp`/`iat` in UTC epoch seconds. The authority keeps no server-side
//! state: a token is valid until it expires, whatever happens to the session
//! cookie that carried it.

use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token lifetime: 24 hours.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Principal id, encoded as a decimal string so it never passes through a float.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Why a token was rejected. Callers must not surface the variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

/// A freshly signed token and its absolute expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Issues and validates session tokens with a process-wide HMAC secret.
#[derive(Clone)]
pub struct SessionTokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl SessionTokenAuthority {
    #[must_use]
    pub fn new(secret: &SecretString, ttl_seconds: i64) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Sign a token for `principal_id` valid from `now` for the configured ttl.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be serialized or signed.
    pub fn issue(
        &self,
        principal_id: i64,
        now: i64,
    ) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        let expires_at = now.saturating_add(self.ttl_seconds);
        let claims = Claims {
            sub: principal_id.to_string(),
            exp: expires_at,
            iat: now,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify the signature, then require `now < exp`, and return the subject.
    ///
    /// # Errors
    /// Returns [`AuthError`] describing the first check that failed.
    pub fn validate(&self, token: &str, now: i64) -> Result<i64, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked below against the caller's clock, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                _ => AuthError::Malformed,
            })?;

        if now >= data.claims.exp {
            return Err(AuthError::Expired);
        }

        parse_subject(&data.claims.sub)
    }
}

impl std::fmt::Debug for SessionTokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenAuthority")
            .field("secret", &"***")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

fn parse_subject(sub: &str) -> Result<i64, AuthError> {
    // only canonical decimal integers; "1.0", "+1" or "1e3" are not principal ids
    if sub.is_empty() || !sub.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::Malformed);
    }
    sub.parse::<i64>().map_err(|_| AuthError::Malformed)
}
