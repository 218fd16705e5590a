//! HS256 token issuing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::{
    validate_claims, Claims, SubjectKind, TokenValidationError, TOKEN_AUDIENCE, TOKEN_ISSUER,
};
use crate::user::User;

/// Lifetime of a token, in hours, when the user has no session TTL of its own.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("jwt secret must not be empty")]
    EmptySecret,

    #[error("token encoding failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Window(#[from] TokenValidationError),
}

/// Signs and verifies identity tokens with one shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Sign arbitrary claims.
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(TokenError::Encode)
    }

    /// Issue a user session token valid from `now`.
    pub fn issue_for_user(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let ttl = user
            .session_ttl()
            .unwrap_or_else(|| Duration::hours(DEFAULT_SESSION_TTL_HOURS));
        let claims = Claims {
            sub: SubjectKind::User,
            id: user.id,
            username: user.username.clone(),
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        self.encode(&claims)
    }

    /// Verify signature, issuer, audience and validity window.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(TokenError::Invalid)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
