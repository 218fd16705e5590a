//! Persistence for companies and users.
//!
//! Two implementations share the traits below:
//! - [`PgStore`]: PostgreSQL via `sqlx`, with embedded migrations
//! - [`InMemoryStore`]: process-local maps for tests and development
//!
//! Both also implement [`companyhub_auth::IdentityStore`], so authorization
//! probes run against the same data the handlers mutate.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use companyhub_auth::{IdentityStore, User};
use companyhub_core::{Company, CompanyFilters, CompanyId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object does not exist")]
    NotFound,

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn create_company(&self, company: &Company) -> Result<(), StoreError>;

    async fn get_company(&self, id: CompanyId) -> Result<Company, StoreError>;

    /// Replace every mutable field of an existing company.
    async fn update_company(&self, company: &Company) -> Result<(), StoreError>;

    async fn delete_company(&self, id: CompanyId) -> Result<(), StoreError>;

    /// Companies matching `filters`, ordered by name.
    async fn list_companies(&self, filters: &CompanyFilters) -> Result<Vec<Company>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; the store assigns `id` and timestamps.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        is_admin: bool,
        session_ttl_hours: i32,
    ) -> Result<User, StoreError>;

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError>;
}

/// Handles to one storage backend under each of its roles.
#[derive(Clone)]
pub struct Stores {
    pub companies: Arc<dyn CompanyStore>,
    pub users: Arc<dyn UserStore>,
    pub identities: Arc<dyn IdentityStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: CompanyStore + UserStore + IdentityStore + 'static,
    {
        Self {
            companies: backend.clone(),
            users: backend.clone(),
            identities: backend,
        }
    }
}
