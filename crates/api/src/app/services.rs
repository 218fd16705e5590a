//! Service wiring: storage backend, validator and the gRPC routes.

use std::sync::Arc;

use anyhow::Context;
use tonic::service::Routes;

use companyhub_auth::password::DEFAULT_ITERATIONS;
use companyhub_auth::{hash_password, TokenCodec, Validator};
use companyhub_events::EventNotifier;
use companyhub_infra::config::PostgresqlConfig;
use companyhub_infra::{InMemoryStore, PgStore, StoreError, Stores, UserStore};

use crate::pb::company_service_server::CompanyServiceServer;
use crate::rpc::CompanyApi;

/// Credentials seeded into the in-memory store (same as the SQL seed).
pub const DEV_ADMIN_USERNAME: &str = "admin";
pub const DEV_ADMIN_PASSWORD: &str = "changeme";

/// Everything the RPC handlers need.
#[derive(Clone)]
pub struct AppServices {
    pub stores: Stores,
    pub validator: Validator,
    pub notifier: EventNotifier,
}

impl AppServices {
    /// Fails when `jwt_secret` is empty.
    pub fn new(stores: Stores, jwt_secret: &str, notifier: EventNotifier) -> anyhow::Result<Self> {
        if jwt_secret.is_empty() {
            anyhow::bail!("jwt_secret must be set");
        }
        let codec = TokenCodec::new(jwt_secret.as_bytes()).context("build token codec")?;
        let validator = Validator::new(codec, stores.identities.clone());
        Ok(Self {
            stores,
            validator,
            notifier,
        })
    }

    pub fn grpc_routes(&self) -> Routes {
        let api = CompanyApi::new(
            self.stores.companies.clone(),
            self.stores.users.clone(),
            self.validator.clone(),
            self.notifier.clone(),
        );
        Routes::new(CompanyServiceServer::new(api))
    }
}

/// PostgreSQL when a DSN is configured, otherwise process-local storage.
pub async fn connect_stores(config: &PostgresqlConfig) -> anyhow::Result<Stores> {
    if config.dsn.is_empty() {
        tracing::warn!("storage: no postgresql dsn, using in-memory stores");
        let store = Arc::new(InMemoryStore::new());
        seed_dev_admin(store.as_ref()).await?;
        return Ok(Stores::from_backend(store));
    }

    let store = PgStore::connect(&config.dsn, config.max_open_connections)
        .await
        .context("connect to postgresql")?;
    if config.automigrate {
        tracing::info!("storage: applying migrations");
        store.migrate().await.context("apply migrations")?;
    }
    Ok(Stores::from_backend(Arc::new(store)))
}

/// Create the development admin unless it already exists.
pub async fn seed_dev_admin(users: &dyn UserStore) -> anyhow::Result<()> {
    let hash = hash_password(DEV_ADMIN_PASSWORD, DEFAULT_ITERATIONS)
        .context("hash dev admin password")?;
    match users
        .create_user(DEV_ADMIN_USERNAME, &hash, true, 0)
        .await
    {
        Ok(_) => {
            tracing::warn!(
                username = DEV_ADMIN_USERNAME,
                "storage: seeded default admin user, change its password"
            );
            Ok(())
        }
        Err(StoreError::AlreadyExists(_)) => Ok(()),
        Err(err) => Err(err).context("seed dev admin"),
    }
}
