//! Per-request protocol dispatch.
//!
//! One listener carries two protocols. [`is_rpc_request`] is the only
//! classification rule: RPC traffic goes to the tonic routes untouched,
//! everything else goes to the REST router once it has been installed.
//!
//! - **Before REST install**: non-RPC requests get `501 Not Implemented`
//! - **CORS**: applied to non-RPC responses only; `OPTIONS` is answered
//!   directly

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, Response, StatusCode, Version};
use axum::Router;
use bytes::Bytes;
use tonic::service::Routes;
use tower::ServiceExt;

use crate::middleware::Cors;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// True iff the request is HTTP/2 and its content type names gRPC.
pub fn is_rpc_request<B>(request: &Request<B>) -> bool {
    request.version() == Version::HTTP_2
        && request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/grpc"))
}

#[derive(Clone)]
pub struct ProtocolRouter {
    grpc: Routes,
    rest: Arc<OnceLock<Router>>,
    cors: Option<Cors>,
}

impl ProtocolRouter {
    pub fn new(grpc: Routes, cors: Option<Cors>) -> Self {
        Self {
            grpc,
            rest: Arc::new(OnceLock::new()),
            cors,
        }
    }

    /// Install the REST handler. Returns `false` if one was already set.
    pub fn install_rest(&self, router: Router) -> bool {
        self.rest.set(router).is_ok()
    }

    pub fn rest_installed(&self) -> bool {
        self.rest.get().is_some()
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<Body>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        if is_rpc_request(&request) {
            return match self.grpc.clone().oneshot(request.map(tonic::body::boxed)).await {
                Ok(response) => response.map(Body::new),
                Err(err) => {
                    tracing::error!(error = %err, "grpc service error");
                    status_only(StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
        }

        let Some(rest) = self.rest.get() else {
            return status_only(StatusCode::NOT_IMPLEMENTED);
        };

        if let Some(cors) = &self.cors {
            if request.method() == Method::OPTIONS {
                return cors.preflight();
            }
        }

        let mut response = match rest.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        if let Some(cors) = &self.cors {
            cors.apply(response.headers_mut());
        }
        response
    }
}

fn status_only(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
    use axum::routing::get;

    use super::*;

    fn request(version: Version, content_type: &str, method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/api/companies")
            .version(version)
            .header(CONTENT_TYPE, content_type)
            .body(Body::empty())
            .unwrap()
    }

    fn router(cors: Option<&str>) -> ProtocolRouter {
        ProtocolRouter::new(Routes::default(), cors.and_then(Cors::new))
    }

    #[test]
    fn classification_needs_http2_and_grpc_content_type() {
        assert!(is_rpc_request(&request(Version::HTTP_2, "application/grpc", Method::POST)));
        assert!(is_rpc_request(&request(
            Version::HTTP_2,
            "application/grpc+proto",
            Method::POST
        )));
        assert!(!is_rpc_request(&request(Version::HTTP_11, "application/grpc", Method::POST)));
        assert!(!is_rpc_request(&request(Version::HTTP_2, "application/json", Method::POST)));
    }

    #[tokio::test]
    async fn rest_before_install_is_not_implemented() {
        let r = router(Some("https://example.com"));
        let res = r
            .handle(request(Version::HTTP_11, "application/json", Method::GET))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
        assert!(!r.rest_installed());
    }

    #[tokio::test]
    async fn installed_rest_router_gets_non_rpc_traffic() {
        let r = router(None);
        assert!(r.install_rest(Router::new().route("/api/companies", get(|| async { "rest" }))));
        assert!(!r.install_rest(Router::new()));

        let res = r
            .handle(request(Version::HTTP_2, "application/json", Method::GET))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn options_is_answered_with_cors_headers() {
        let r = router(Some("https://example.com"));
        r.install_rest(Router::new());

        let res = r
            .handle(request(Version::HTTP_11, "text/plain", Method::OPTIONS))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn rest_responses_carry_cors_origin() {
        let r = router(Some("https://example.com"));
        r.install_rest(Router::new().route("/api/companies", get(|| async { "rest" })));

        let res = r
            .handle(request(Version::HTTP_11, "application/json", Method::GET))
            .await;
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");
    }

    #[tokio::test]
    async fn rpc_traffic_bypasses_rest_and_cors() {
        let r = router(Some("https://example.com"));
        r.install_rest(Router::new().fallback(|| async { "rest" }));

        let res = r
            .handle(request(Version::HTTP_2, "application/grpc", Method::POST))
            .await;
        // No services registered: tonic answers, not the REST fallback.
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_ne!(&body[..], b"rest");
    }
}
