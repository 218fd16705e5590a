use std::path::PathBuf;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{Html, IntoResponse},
};

/// Location of the documentation page under the static directory.
pub const DOCS_PAGE: &str = "swagger/index.html";

/// Root of the static files served by the REST side.
#[derive(Debug, Clone)]
pub struct StaticDir(pub PathBuf);

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn docs(Extension(StaticDir(root)): Extension<StaticDir>) -> axum::response::Response {
    let path = root.join(DOCS_PAGE);
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page).into_response(),
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "get swagger template error");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
