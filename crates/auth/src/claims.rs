use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Issuer and audience stamped into every token this service issues.
pub const TOKEN_ISSUER: &str = "as";
pub const TOKEN_AUDIENCE: &str = "as";

/// Kind of principal a token was issued for.
///
/// Unrecognised `sub` values decode to [`SubjectKind::Other`] so that rules can
/// deny them explicitly instead of failing the decode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    ApiKey,
    #[serde(other)]
    Other,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::ApiKey => "api_key",
            SubjectKind::Other => "other",
        }
    }
}

impl core::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims model.
///
/// Decoded from a verified token and held only for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject kind (`user` or `api_key`).
    pub sub: SubjectKind,

    /// Numeric identifier of the subject.
    pub id: i64,

    #[serde(default)]
    pub username: String,

    pub iss: String,
    pub aud: String,

    /// Not-before, seconds since the epoch.
    pub nbf: i64,

    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token time window (exp <= nbf)")]
    InvalidTimeWindow,
}

/// Check the claims' validity window against `now`.
///
/// Signature and issuer/audience checks happen in [`crate::TokenCodec`].
pub fn validate_claims(claims: &Claims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.nbf {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.nbf {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
