//! Infrastructure layer: configuration, PostgreSQL storage, Kafka transport.

pub mod config;
pub mod kafka;
pub mod storage;

pub use config::{Config, ConfigError};
pub use storage::{CompanyStore, InMemoryStore, PgStore, StoreError, Stores, UserStore};
