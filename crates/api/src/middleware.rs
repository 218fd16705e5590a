//! CORS handling for the non-RPC side of the listener.

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};

pub const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE";
pub const ALLOW_HEADERS: &str =
    "Accept, Content-Type, Content-Length, Accept-Encoding, Grpc-Metadata-Authorization";

/// Configured CORS policy: one allowed origin.
#[derive(Debug, Clone)]
pub struct Cors {
    origin: HeaderValue,
}

impl Cors {
    /// `None` when `origin` is empty or not a valid header value.
    pub fn new(origin: &str) -> Option<Self> {
        if origin.is_empty() {
            return None;
        }
        match HeaderValue::from_str(origin) {
            Ok(origin) => Some(Self { origin }),
            Err(_) => {
                tracing::warn!(origin, "ignoring invalid cors_allow_origin");
                None
            }
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }

    /// Empty `200 OK` answer to an `OPTIONS` request.
    pub fn preflight(&self) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        self.apply(response.headers_mut());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_origin_disables_cors() {
        assert!(Cors::new("").is_none());
        assert!(Cors::new("bad\norigin").is_none());
    }

    #[test]
    fn preflight_carries_all_three_headers() {
        let cors = Cors::new("https://example.com").unwrap();
        let res = cors.preflight();
        assert_eq!(res.status(), StatusCode::OK);
        let h = res.headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_METHODS], ALLOW_METHODS);
        assert_eq!(h[ACCESS_CONTROL_ALLOW_HEADERS], ALLOW_HEADERS);
    }
}
