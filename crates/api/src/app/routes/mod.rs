use std::path::PathBuf;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::services::ServeDir;

use crate::gateway::Gateway;

pub mod companies;
pub mod login;
pub mod system;

/// REST surface: JSON mirror of the RPC contract, docs, health and static
/// files.
pub fn router(gateway: Gateway, static_dir: PathBuf) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/api", get(system::docs))
        .route("/api/internal/login", post(login::login))
        .nest("/api/companies", companies::router())
        .fallback_service(ServeDir::new(&static_dir))
        .layer(Extension(gateway))
        .layer(Extension(system::StaticDir(static_dir)))
}
