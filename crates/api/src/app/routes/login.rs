use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::app::{dto, errors};
use crate::gateway::Gateway;
use crate::pb;

pub async fn login(
    Extension(gateway): Extension<Gateway>,
    headers: HeaderMap,
    body: Result<Json<dto::LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };

    let request = gateway.request(
        &headers,
        pb::LoginRequest {
            user: body.user,
            password: body.password,
        },
    );
    match gateway.client().login(request).await {
        Ok(res) => (
            StatusCode::OK,
            Json(dto::LoginResponse {
                jwt: res.into_inner().jwt,
            }),
        )
            .into_response(),
        Err(status) => errors::status_to_response(status),
    }
}
