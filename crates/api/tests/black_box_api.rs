use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use reqwest::StatusCode;
use serde_json::json;
use tonic::transport::{Certificate, ClientTlsConfig, Endpoint};

use companyhub_api::app::{self, services, AppServices, RunningServer};
use companyhub_api::pb;
use companyhub_api::pb::company_service_client::CompanyServiceClient;
use companyhub_events::{EventPublisher, KeyTemplate, PublishQueue, QueueConfig, RecordingWriter};
use companyhub_infra::config::{ExternalApiConfig, DEFAULT_EVENT_KEY_TEMPLATE};
use companyhub_infra::{InMemoryStore, Stores};

const JWT_SECRET: &str = "black-box-secret";
const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    base_url: String,
    grpc_url: String,
    writer: Arc<RecordingWriter>,
    server: Option<RunningServer>,
    queue: Option<PublishQueue>,
}

impl TestServer {
    async fn spawn(cors_allow_origin: &str) -> Self {
        Self::spawn_with(ExternalApiConfig {
            cors_allow_origin: cors_allow_origin.to_string(),
            ..ExternalApiConfig::default()
        })
        .await
    }

    async fn spawn_tls(files: &TlsFiles) -> Self {
        Self::spawn_with(ExternalApiConfig {
            tls_cert: files.cert.display().to_string(),
            tls_key: files.key.display().to_string(),
            ..ExternalApiConfig::default()
        })
        .await
    }

    async fn spawn_with(config: ExternalApiConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        services::seed_dev_admin(store.as_ref()).await.unwrap();

        let writer = Arc::new(RecordingWriter::new());
        let publisher = EventPublisher::new(
            writer.clone(),
            KeyTemplate::parse(DEFAULT_EVENT_KEY_TEMPLATE).unwrap(),
        );
        let queue = PublishQueue::start(publisher, QueueConfig::default());

        let services =
            AppServices::new(Stores::from_backend(store), JWT_SECRET, queue.notifier()).unwrap();

        // Same wiring as prod, but on an ephemeral port.
        let config = ExternalApiConfig {
            bind: "127.0.0.1:0".to_string(),
            jwt_secret: JWT_SECRET.to_string(),
            static_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/../../static").to_string(),
            ..config
        };
        let tls = config.tls_enabled();
        let server = app::start(&config, services).await.unwrap();
        let addr = server.local_addr();
        let base_url = if tls {
            format!("https://localhost:{}", addr.port())
        } else {
            format!("http://{addr}")
        };

        Self {
            grpc_url: base_url.clone(),
            base_url,
            writer,
            server: Some(server),
            queue: Some(queue),
        }
    }

    async fn grpc(&self) -> CompanyServiceClient<tonic::transport::Channel> {
        CompanyServiceClient::connect(self.grpc_url.clone())
            .await
            .expect("grpc connect")
    }

    async fn grpc_tls(&self, ca_pem: &str) -> CompanyServiceClient<tonic::transport::Channel> {
        // Already installed by a parallel test is fine.
        let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
        let channel = Endpoint::from_shared(self.grpc_url.clone())
            .unwrap()
            .tls_config(
                ClientTlsConfig::new()
                    .ca_certificate(Certificate::from_pem(ca_pem))
                    .domain_name("localhost"),
            )
            .unwrap()
            .connect()
            .await
            .expect("grpc tls connect");
        CompanyServiceClient::new(channel)
    }

    async fn stop(mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
        if let Some(queue) = self.queue.take() {
            assert!(queue.shutdown(WAIT).await);
        }
    }
}

/// Certificate and key files served by a TLS test server.
struct TlsFiles {
    dir: PathBuf,
    cert: PathBuf,
    key: PathBuf,
    /// PEM a standard client trusts to reach the server.
    ca_pem: String,
}

impl TlsFiles {
    fn write(label: &str, cert_pem: &str, key_pem: &str, ca_pem: String) -> Self {
        let dir = std::env::temp_dir().join(format!("companyhub-tls-{label}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("cert.pem");
        let key = dir.join("key.pem");
        std::fs::write(&cert, cert_pem).unwrap();
        std::fs::write(&key, key_pem).unwrap();
        Self { dir, cert, key, ca_pem }
    }

    /// Self-signed with `CA:TRUE`, like a default `openssl req -x509`.
    fn self_signed_ca(label: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "companyhub self-signed");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        Self::write(label, &cert.pem(), &key.serialize_pem(), cert.pem())
    }

    /// Leaf issued by a throwaway CA; only the leaf is served.
    fn ca_issued_leaf(label: &str) -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.distinguished_name.push(DnType::CommonName, "companyhub test ca");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let mut leaf_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        leaf_params.distinguished_name.push(DnType::CommonName, "localhost");
        let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

        Self::write(label, &leaf.pem(), &leaf_key.serialize_pem(), ca.pem())
    }
}

impl Drop for TlsFiles {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

/// The test client doesn't check the server certificate; the server's own
/// loopback client is what runs under test.
fn https_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}

async fn rest_create_then_get(srv: &TestServer, client: &reqwest::Client) {
    let jwt = rest_login(client, &srv.base_url).await;

    let res = client
        .post(format!("{}/api/companies", srv.base_url))
        .header("Grpc-Metadata-Authorization", format!("Bearer {jwt}"))
        .json(&json!({ "company": {
            "name": "tls-co",
            "description": "over https",
            "employeesCount": 3,
            "registered": false,
            "companyType": "COMPANY_TYPE_COOPERATIVE",
        }}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .get(format!("{}/api/companies/{id}", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["company"]["name"], "tls-co");
    assert_eq!(body["company"]["companyType"], "COMPANY_TYPE_COOPERATIVE");
    assert!(srv.writer.wait_for(1, WAIT).await);
}

fn mint_jwt(sub: &str, id: i64, username: &str) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": sub,
        "id": id,
        "username": username,
        "iss": "as",
        "aud": "as",
        "nbf": (now - ChronoDuration::minutes(1)).timestamp(),
        "exp": (now + ChronoDuration::minutes(10)).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn authorized<T>(message: T, jwt: &str) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    request
        .metadata_mut()
        .insert("authorization", format!("Bearer {jwt}").parse().unwrap());
    request
}

fn pb_company(name: &str, employees: u32) -> pb::Company {
    pb::Company {
        name: name.to_string(),
        description: "widgets".to_string(),
        employees_count: employees,
        registered: true,
        company_type: pb::CompanyType::Corporation as i32,
        ..Default::default()
    }
}

async fn rest_login(client: &reqwest::Client, base_url: &str) -> String {
    let res = client
        .post(format!("{base_url}/api/internal/login"))
        .json(&json!({ "user": "admin", "password": "changeme" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    body["jwt"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn grpc_crud_publishes_one_message_per_mutation() {
    let srv = TestServer::spawn("").await;
    let mut grpc = srv.grpc().await;

    let jwt = grpc
        .login(pb::LoginRequest {
            user: "admin".into(),
            password: "changeme".into(),
        })
        .await
        .unwrap()
        .into_inner()
        .jwt;

    let id = grpc
        .create(authorized(
            pb::CreateCompanyRequest {
                company: Some(pb_company("acme", 10)),
            },
            &jwt,
        ))
        .await
        .unwrap()
        .into_inner()
        .id;
    assert!(srv.writer.wait_for(1, WAIT).await);

    let fetched = grpc
        .get(pb::GetCompanyRequest { id: id.clone() })
        .await
        .unwrap()
        .into_inner()
        .company
        .unwrap();
    assert_eq!(fetched.name, "acme");
    assert_eq!(fetched.employees_count, 10);

    grpc.update(authorized(
        pb::UpdateCompanyRequest {
            company: Some(pb::Company {
                id: id.clone(),
                ..pb_company("acme", 20)
            }),
        },
        &jwt,
    ))
    .await
    .unwrap();
    assert!(srv.writer.wait_for(2, WAIT).await);

    grpc.delete(authorized(pb::DeleteCompanyRequest { id: id.clone() }, &jwt))
        .await
        .unwrap();
    assert!(srv.writer.wait_for(3, WAIT).await);

    let status = grpc
        .get(pb::GetCompanyRequest { id: id.clone() })
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::NotFound);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let messages = srv.writer.messages();
    assert_eq!(messages.len(), 3);

    let keys: Vec<String> = messages
        .iter()
        .map(|m| m.key_str().unwrap().to_string())
        .collect();
    assert_eq!(
        keys,
        [
            format!("company.{id}.event.created"),
            format!("company.{id}.event.updated"),
            format!("company.{id}.event.deleted"),
        ]
    );

    let created: serde_json::Value = serde_json::from_slice(&messages[0].value).unwrap();
    assert_eq!(created["name"], "acme");
    let updated: serde_json::Value = serde_json::from_slice(&messages[1].value).unwrap();
    assert_eq!(updated["employees_count"], 20);
    assert!(messages[2].value.is_empty());

    srv.stop().await;
}

#[tokio::test]
async fn rest_crud_publishes_one_message_per_mutation() {
    let srv = TestServer::spawn("").await;
    let client = reqwest::Client::new();
    let jwt = rest_login(&client, &srv.base_url).await;

    let res = client
        .post(format!("{}/api/companies", srv.base_url))
        .header("Grpc-Metadata-Authorization", format!("Bearer {jwt}"))
        .json(&json!({
            "company": {
                "name": "globex",
                "description": "",
                "employeesCount": 5,
                "registered": false,
                "companyType": "COMPANY_TYPE_COOPERATIVE"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let id = res.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(srv.writer.wait_for(1, WAIT).await);

    let res = client
        .get(format!("{}/api/companies/{id}", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    // Defaults are emitted.
    assert_eq!(body["company"]["registered"], false);
    assert_eq!(body["company"]["description"], "");
    assert_eq!(body["company"]["companyType"], "COMPANY_TYPE_COOPERATIVE");

    let res = client
        .put(format!("{}/api/companies/{id}", srv.base_url))
        .bearer_auth(&jwt)
        .json(&json!({
            "company": {
                "name": "globex",
                "employeesCount": 6,
                "registered": true,
                "companyType": "COMPANY_TYPE_COOPERATIVE"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(srv.writer.wait_for(2, WAIT).await);

    let res = client
        .get(format!("{}/api/companies", srv.base_url))
        .query(&[("registered", "true"), ("companyType", "COMPANY_TYPE_COOPERATIVE")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    let result = body["result"].as_array().unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["employeesCount"], 6);

    let res = client
        .delete(format!("{}/api/companies/{id}", srv.base_url))
        .bearer_auth(&jwt)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(srv.writer.wait_for(3, WAIT).await);

    let res = client
        .get(format!("{}/api/companies/{id}", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["code"], 5);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(srv.writer.len(), 3);

    srv.stop().await;
}

#[tokio::test]
async fn mutations_without_a_valid_user_are_unauthenticated() {
    let srv = TestServer::spawn("").await;
    let client = reqwest::Client::new();
    let body = json!({
        "company": {
            "name": "initech",
            "employeesCount": 1,
            "companyType": "COMPANY_TYPE_CORPORATION"
        }
    });

    // No token.
    let res = client
        .post(format!("{}/api/companies", srv.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "unauthenticated");
    assert_eq!(err["code"], 16);

    // Well-signed token for a user that does not exist.
    let ghost = mint_jwt("user", 999, "ghost");
    let res = client
        .post(format!("{}/api/companies", srv.base_url))
        .bearer_auth(&ghost)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // API keys are never allowed to mutate, even with a matching id.
    let api_key = mint_jwt("api_key", 1, "admin");
    let mut grpc = srv.grpc().await;
    let status = grpc
        .create(authorized(
            pb::CreateCompanyRequest {
                company: Some(pb_company("initech", 1)),
            },
            &api_key,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);

    // Unknown subject kinds are denied too.
    let robot = mint_jwt("robot", 1, "admin");
    let status = grpc
        .create(authorized(
            pb::CreateCompanyRequest {
                company: Some(pb_company("initech", 1)),
            },
            &robot,
        ))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);

    // Matching user id is enough even if the username changed.
    let renamed = mint_jwt("user", 1, "renamed");
    grpc.create(authorized(
        pb::CreateCompanyRequest {
            company: Some(pb_company("initech", 1)),
        },
        &renamed,
    ))
    .await
    .unwrap();
    assert!(srv.writer.wait_for(1, WAIT).await);
    assert_eq!(srv.writer.len(), 1);

    srv.stop().await;
}

#[tokio::test]
async fn invalid_input_and_conflicts_map_to_http_statuses() {
    let srv = TestServer::spawn("").await;
    let client = reqwest::Client::new();
    let jwt = rest_login(&client, &srv.base_url).await;
    let create = |name: &str| {
        client
            .post(format!("{}/api/companies", srv.base_url))
            .bearer_auth(&jwt)
            .json(&json!({
                "company": {
                    "name": name,
                    "employeesCount": 2,
                    "companyType": "COMPANY_TYPE_NON_PROFIT"
                }
            }))
    };

    let res = create("a name far too long for it").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_argument");

    assert_eq!(create("hooli").send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(create("hooli").send().await.unwrap().status(), StatusCode::CONFLICT);

    let res = client
        .get(format!("{}/api/companies/not-a-uuid", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{}/api/internal/login", srv.base_url))
        .json(&json!({ "user": "admin", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Only the successful create was published.
    assert!(srv.writer.wait_for(1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(srv.writer.len(), 1);

    srv.stop().await;
}

#[tokio::test]
async fn options_is_answered_with_cors_headers() {
    let srv = TestServer::spawn("https://example.com").await;
    let client = reqwest::Client::new();

    let res = client
        .request(reqwest::Method::OPTIONS, format!("{}/anything/at/all", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "https://example.com");
    assert_eq!(
        headers["access-control-allow-methods"],
        "POST, GET, OPTIONS, PUT, DELETE"
    );
    assert_eq!(
        headers["access-control-allow-headers"],
        "Accept, Content-Type, Content-Length, Accept-Encoding, Grpc-Metadata-Authorization"
    );
    assert!(res.bytes().await.unwrap().is_empty());

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["access-control-allow-origin"], "https://example.com");

    srv.stop().await;
}

#[tokio::test]
async fn docs_health_and_static_files_are_served() {
    let srv = TestServer::spawn("").await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("access-control-allow-origin").is_none());

    let res = client.get(format!("{}/api", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().contains("companyhub REST API"));

    let res = client
        .get(format!("{}/index.html", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/no-such-file.txt", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    srv.stop().await;
}

#[tokio::test]
async fn tls_with_self_signed_ca_certificate_serves_rest() {
    let files = TlsFiles::self_signed_ca("self-signed");
    let srv = TestServer::spawn_tls(&files).await;

    rest_create_then_get(&srv, &https_client()).await;

    srv.stop().await;
}

#[tokio::test]
async fn tls_with_ca_issued_leaf_serves_grpc_and_rest() {
    let files = TlsFiles::ca_issued_leaf("leaf");
    let srv = TestServer::spawn_tls(&files).await;

    let mut grpc = srv.grpc_tls(&files.ca_pem).await;
    let jwt = grpc
        .login(pb::LoginRequest {
            user: "admin".into(),
            password: "changeme".into(),
        })
        .await
        .unwrap()
        .into_inner()
        .jwt;
    let id = grpc
        .create(authorized(
            pb::CreateCompanyRequest {
                company: Some(pb_company("grpc-tls", 4)),
            },
            &jwt,
        ))
        .await
        .unwrap()
        .into_inner()
        .id;
    let fetched = grpc
        .get(pb::GetCompanyRequest { id })
        .await
        .unwrap()
        .into_inner()
        .company
        .unwrap();
    assert_eq!(fetched.name, "grpc-tls");

    // The REST side answers through the loopback client over the same TLS.
    let client = https_client();
    let res = client
        .get(format!("{}/api/companies", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["result"].as_array().unwrap().len(), 1);

    rest_create_then_get(&srv, &client).await;

    srv.stop().await;
}
