use async_trait::async_trait;
use thiserror::Error;

use crate::rule::Probe;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("identity store query failed: {0}")]
    Backend(String),

    #[error("identity store cannot evaluate probe: {0}")]
    Unsupported(String),
}

/// Executes bound authorization probes.
///
/// `Ok(true)` iff at least one row of the probe's entity satisfies the clause.
/// A store must never report a missing subject as an error.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn probe(&self, probe: &Probe<'_>) -> Result<bool, ProbeError>;
}
