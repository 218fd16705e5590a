use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tonic::Code;

/// HTTP status a gRPC code maps to on the JSON side.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// snake_case name of a gRPC code, used as the `error` field.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "ok",
        Code::Cancelled => "cancelled",
        Code::Unknown => "unknown",
        Code::InvalidArgument => "invalid_argument",
        Code::DeadlineExceeded => "deadline_exceeded",
        Code::NotFound => "not_found",
        Code::AlreadyExists => "already_exists",
        Code::PermissionDenied => "permission_denied",
        Code::ResourceExhausted => "resource_exhausted",
        Code::FailedPrecondition => "failed_precondition",
        Code::Aborted => "aborted",
        Code::OutOfRange => "out_of_range",
        Code::Unimplemented => "unimplemented",
        Code::Internal => "internal",
        Code::Unavailable => "unavailable",
        Code::DataLoss => "data_loss",
        Code::Unauthenticated => "unauthenticated",
    }
}

pub fn json_error(code: Code, message: impl Into<String>) -> axum::response::Response {
    (
        http_status(code),
        axum::Json(json!({
            "error": code_name(code),
            "code": code as i32,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn status_to_response(status: tonic::Status) -> axum::response::Response {
    json_error(status.code(), status.message())
}

pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(Code::InvalidArgument, message)
}
