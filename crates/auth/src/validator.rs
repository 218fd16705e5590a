//! Request authorization: token decode plus rule evaluation.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::claims::Claims;
use crate::operation::OperationKind;
use crate::rule::AuthorizationRule;
use crate::store::{IdentityStore, ProbeError};
use crate::token::{TokenCodec, TokenError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication token is missing")]
    MissingToken,

    #[error(transparent)]
    InvalidToken(#[from] TokenError),

    #[error("rule '{rule}' denied {operation}")]
    Denied {
        rule: String,
        operation: OperationKind,
    },

    #[error("rule '{rule}' could not be evaluated for {operation}: {source}")]
    Query {
        rule: String,
        operation: OperationKind,
        #[source]
        source: ProbeError,
    },
}

impl AuthError {
    /// True for failures of the identity store rather than of the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Query { .. })
    }
}

/// Decodes request tokens and evaluates rules against the identity store.
#[derive(Clone)]
pub struct Validator {
    codec: TokenCodec,
    store: Arc<dyn IdentityStore>,
}

impl Validator {
    pub fn new(codec: TokenCodec, store: Arc<dyn IdentityStore>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Authorize one request.
    ///
    /// `token` may carry a `Bearer ` prefix. Rules run in order and the first
    /// denial or store failure wins.
    pub async fn validate(
        &self,
        token: Option<&str>,
        operation: OperationKind,
        rules: &[&AuthorizationRule],
    ) -> Result<Claims, AuthError> {
        let token = token
            .map(|t| t.strip_prefix("Bearer ").unwrap_or(t).trim())
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.codec.decode(token, Utc::now())?;

        for rule in rules {
            let allowed = match rule.bind(&claims) {
                None => false,
                Some(probe) => self.store.probe(&probe).await.map_err(|source| {
                    tracing::error!(
                        rule = rule.name(),
                        operation = %operation,
                        error = %source,
                        "authorization probe failed"
                    );
                    AuthError::Query {
                        rule: rule.name().to_string(),
                        operation,
                        source,
                    }
                })?,
            };

            if !allowed {
                tracing::info!(
                    rule = rule.name(),
                    operation = %operation,
                    subject = %claims.sub,
                    id = claims.id,
                    "authorization denied"
                );
                return Err(AuthError::Denied {
                    rule: rule.name().to_string(),
                    operation,
                });
            }
        }

        tracing::debug!(operation = %operation, id = claims.id, "authorized");
        Ok(claims)
    }
}
