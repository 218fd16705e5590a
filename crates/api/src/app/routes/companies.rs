use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{dto, errors};
use crate::gateway::Gateway;
use crate::pb;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_company).get(list_companies))
        .route("/:id", get(get_company).put(update_company).delete(delete_company))
}

pub async fn create_company(
    Extension(gateway): Extension<Gateway>,
    headers: HeaderMap,
    body: Result<Json<dto::CompanyBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let company = match body.company.into_pb() {
        Ok(company) => company,
        Err(res) => return res,
    };

    let request = gateway.request(
        &headers,
        pb::CreateCompanyRequest {
            company: Some(company),
        },
    );
    match gateway.client().create(request).await {
        Ok(res) => (
            StatusCode::OK,
            Json(dto::CreateCompanyResponse {
                id: res.into_inner().id,
            }),
        )
            .into_response(),
        Err(status) => errors::status_to_response(status),
    }
}

pub async fn get_company(
    Extension(gateway): Extension<Gateway>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request = gateway.request(&headers, pb::GetCompanyRequest { id });
    match gateway.client().get(request).await {
        Ok(res) => {
            let company = res.into_inner().company.map(dto::CompanyDto::from).unwrap_or_default();
            (StatusCode::OK, Json(dto::CompanyBody { company })).into_response()
        }
        Err(status) => errors::status_to_response(status),
    }
}

pub async fn update_company(
    Extension(gateway): Extension<Gateway>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<dto::CompanyBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    // The path names the company; a body id is ignored.
    let company = match body.company.into_pb() {
        Ok(company) => pb::Company { id, ..company },
        Err(res) => return res,
    };

    let request = gateway.request(
        &headers,
        pb::UpdateCompanyRequest {
            company: Some(company),
        },
    );
    match gateway.client().update(request).await {
        Ok(_) => (StatusCode::OK, Json(dto::Empty {})).into_response(),
        Err(status) => errors::status_to_response(status),
    }
}

pub async fn delete_company(
    Extension(gateway): Extension<Gateway>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request = gateway.request(&headers, pb::DeleteCompanyRequest { id });
    match gateway.client().delete(request).await {
        Ok(_) => (StatusCode::OK, Json(dto::Empty {})).into_response(),
        Err(status) => errors::status_to_response(status),
    }
}

pub async fn list_companies(
    Extension(gateway): Extension<Gateway>,
    headers: HeaderMap,
    query: Result<Query<dto::ListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return errors::bad_request(rejection.body_text()),
    };
    let message = match query.into_pb() {
        Ok(message) => message,
        Err(res) => return res,
    };

    let request = gateway.request(&headers, message);
    match gateway.client().list(request).await {
        Ok(res) => {
            let result = res
                .into_inner()
                .result
                .into_iter()
                .map(dto::CompanyDto::from)
                .collect();
            (StatusCode::OK, Json(dto::ListCompaniesResponse { result })).into_response()
        }
        Err(status) => errors::status_to_response(status),
    }
}
