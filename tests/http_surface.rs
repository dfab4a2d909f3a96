use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::Json;
use axum::routing::get;
use axum_test::{TestResponse, TestServer};
use proptest::prelude::*;
use serde_json::{Value, json};

use lifeec::seed::MIN_COST;
use lifeec::{
    ApiError, Config, DocumentStore, InMemoryAccountStore, InMemoryDocumentStore, Resource, RouteTable,
    Routes, RuntimeMode, compose, default_seed_accounts, reseed_privileged_accounts,
};

/// Test infrastructure for exercising the composed HTTP surface
pub struct ApiTestServer {
    pub server: TestServer,
    pub accounts: Arc<InMemoryAccountStore>,
    pub documents: Arc<InMemoryDocumentStore>,
}

impl ApiTestServer {
    /// The production table over fresh in-memory stores
    pub fn new(mode: RuntimeMode) -> Self {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let table = RouteTable::standard(accounts.clone(), documents.clone());
        let server = TestServer::new(compose(table, &config(mode)).unwrap()).unwrap();
        Self {
            server,
            accounts,
            documents,
        }
    }

    /// Resets the privileged accounts with the default password
    pub async fn seed(&self) {
        reseed_privileged_accounts(
            self.accounts.as_ref(),
            &default_seed_accounts("12345"),
            MIN_COST,
        )
        .await
        .unwrap();
    }
}

fn config(mode: RuntimeMode) -> Config {
    Config {
        mode,
        ..Config::default()
    }
}

fn serve(table: RouteTable, mode: RuntimeMode) -> TestServer {
    TestServer::new(compose(table, &config(mode)).unwrap()).unwrap()
}

//////////////////////////////////////////// Fake resources ////////////////////////////////////////////

/// Answers every path below its prefix with its own name and the remaining path
struct Echo {
    name: &'static str,
    routes: &'static [&'static str],
}

impl Resource for Echo {
    fn routes(&self) -> Routes {
        let name = self.name;
        self.routes.iter().fold(Routes::new(), |routes, path| {
            let handler = if path.contains('*') || path.contains(':') {
                get(move |Path(rest): Path<String>| async move {
                    Json(json!({"mount": name, "rest": rest}))
                })
            } else {
                get(move || async move { Json(json!({"mount": name, "rest": ""})) })
            };
            routes.route(*path, handler)
        })
    }
}

/// Fails every request
struct Failing;

impl Resource for Failing {
    fn routes(&self) -> Routes {
        Routes::new().route(
            "/",
            get(|| async { Err::<Json<Value>, _>(ApiError::Internal("database exploded".to_string())) }),
        )
    }
}

/// Panics on every request
struct Panicking;

impl Resource for Panicking {
    fn routes(&self) -> Routes {
        Routes::new().route(
            "/",
            get(|| async {
                if true {
                    panic!("handler invariant violated");
                }
                Json(json!({}))
            }),
        )
    }
}

const ECHOED_MOUNTS: &[(&str, &str)] = &[
    ("/api/v1/patient", "patients"),
    ("/api/v1/dashboard", "dashboard"),
    ("/api/v1/resident", "residents"),
    ("/api/v1/health-progress", "healthProgress"),
    ("/api/v1/activities", "activities"),
    ("/api/v1/meal", "meal"),
    ("/api/v1/user", "users"),
    ("/api/v1/messages", "messages"),
    ("/api/v1/auth", "auth"),
];

fn echo_table() -> RouteTable {
    let legacy = Echo {
        name: "legacy",
        routes: &["/users", "/users/*rest"],
    };
    ECHOED_MOUNTS.iter().fold(
        RouteTable::new().mount_unlisted("/api/v1", &legacy),
        |table, (prefix, key)| {
            table.mount(
                *prefix,
                *key,
                &Echo {
                    name: *key,
                    routes: &["/", "/*rest"],
                },
            )
        },
    )
}

////////////////////////////////////////////// Root document //////////////////////////////////////////////

#[tokio::test]
async fn root_document_lists_every_resource() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    let response = api.server.get("/").await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({
            "status": "success",
            "message": "LIFEEC API is running",
            "endpoints": {
                "patients": "/api/v1/patient",
                "dashboard": "/api/v1/dashboard",
                "residents": "/api/v1/resident",
                "healthProgress": "/api/v1/health-progress",
                "activities": "/api/v1/activities",
                "meal": "/api/v1/meal",
                "users": "/api/v1/user",
                "messages": "/api/v1/messages",
                "auth": "/api/v1/auth"
            }
        })
    );
}

#[tokio::test]
async fn root_document_matches_mounted_prefixes() {
    let server = serve(echo_table(), RuntimeMode::Production);
    let document = server.get("/").await.json::<Value>();
    let endpoints = document["endpoints"].as_object().unwrap();
    assert_eq!(endpoints.len(), ECHOED_MOUNTS.len());
    for (key, prefix) in endpoints {
        let response = server.get(&format!("{}/anything", prefix.as_str().unwrap())).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["mount"], json!(key));
    }
}

//////////////////////////////////////////////// Delegation ////////////////////////////////////////////////

#[tokio::test]
async fn every_prefix_delegates_to_its_collaborator() {
    let server = serve(echo_table(), RuntimeMode::Production);
    for (prefix, key) in ECHOED_MOUNTS {
        let response = server.get(&format!("{}/anything", prefix)).await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({"mount": key, "rest": "anything"}),
            "prefix {}",
            prefix
        );
    }
}

#[tokio::test]
async fn longer_prefix_wins_over_legacy_mount() {
    let server = serve(echo_table(), RuntimeMode::Production);
    let legacy = server.get("/api/v1/users/7").await.json::<Value>();
    assert_eq!(legacy["mount"], "legacy");
    let nested = server.get("/api/v1/user/users/7").await.json::<Value>();
    assert_eq!(nested["mount"], "users");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn arbitrary_subpaths_reach_the_owning_mount(
        idx in 0..ECHOED_MOUNTS.len(),
        segments in proptest::collection::vec("[a-zA-Z0-9_-]{1,12}", 1..4),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (prefix, key) = ECHOED_MOUNTS[idx];
        let rest = segments.join("/");
        let body = runtime.block_on(async {
            let server = serve(echo_table(), RuntimeMode::Production);
            server.get(&format!("{}/{}", prefix, rest)).await.json::<Value>()
        });
        prop_assert_eq!(body, json!({"mount": key, "rest": rest}));
    }
}

//////////////////////////////////////////////// Not found ////////////////////////////////////////////////

#[tokio::test]
async fn unknown_resource_is_exactly_route_not_found() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    let response = api.server.get("/api/v1/unknown-resource").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(
        response.json::<Value>(),
        json!({"status": "error", "message": "Route not found"})
    );
}

#[tokio::test]
async fn not_found_is_uniform_for_every_method() {
    let api = ApiTestServer::new(RuntimeMode::Development);
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
    let mut requests: Vec<(Method, &str)> = methods
        .into_iter()
        .map(|method| (method, "/nowhere/at/all"))
        .collect();
    // paths that exist, but not under these methods
    requests.extend([
        (Method::POST, "/"),
        (Method::DELETE, "/api/v1/users"),
        (Method::PUT, "/api/v1/auth/login"),
        (Method::DELETE, "/api/v1/meal"),
        (Method::POST, "/api/v1/user/users/1"),
    ]);
    for (method, path) in requests {
        let response = api.server.method(method.clone(), path).await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<Value>(),
            json!({"status": "error", "message": "Route not found"}),
            "{} {}",
            method,
            path
        );
    }
}

////////////////////////////////////////////// Error stage //////////////////////////////////////////////

fn faulty_table() -> RouteTable {
    RouteTable::new()
        .mount("/api/v1/failing", "failing", &Failing)
        .mount("/api/v1/panicking", "panicking", &Panicking)
}

#[tokio::test]
async fn production_errors_hide_detail() {
    let server = serve(faulty_table(), RuntimeMode::Production);
    for path in ["/api/v1/failing", "/api/v1/panicking"] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.json::<Value>(),
            json!({"status": "error", "message": "Something went wrong!", "error": {}}),
            "path {}",
            path
        );
    }
}

#[tokio::test]
async fn development_errors_carry_detail() {
    let server = serve(faulty_table(), RuntimeMode::Development);

    let failing = server.get("/api/v1/failing").await;
    failing.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body = failing.json::<Value>();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Something went wrong!");
    assert_eq!(body["error"], "database exploded");

    let panicking = server.get("/api/v1/panicking").await;
    panicking.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(panicking.json::<Value>()["error"], "handler invariant violated");
}

#[tokio::test]
async fn server_keeps_serving_after_a_panic() {
    let server = serve(faulty_table(), RuntimeMode::Production);
    server
        .get("/api/v1/panicking")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    server.get("/").await.assert_status_ok();
}

///////////////////////////////////////////////// CORS /////////////////////////////////////////////////

#[tokio::test]
async fn allowed_origin_is_echoed_with_credentials() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    let response = api
        .server
        .get("/")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:5173"))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "http://localhost:5173"
    );
    assert_eq!(
        response.header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
        "true"
    );
}

#[tokio::test]
async fn unknown_origin_gets_no_cors_headers() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    let response = api
        .server
        .get("/")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://evil.example"))
        .await;
    response.assert_status_ok();
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn preflight_lists_allowed_methods_and_headers() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    let response = api
        .server
        .method(Method::OPTIONS, "/api/v1/meal")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://lifeec.vercel.app"))
        .add_header(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("PUT"),
        )
        .add_header(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("authorization"),
        )
        .await;
    response.assert_status_ok();
    let methods = response.header(header::ACCESS_CONTROL_ALLOW_METHODS);
    let methods = methods.to_str().unwrap();
    for method in ["GET", "POST", "PUT", "DELETE"] {
        assert!(methods.contains(method), "{} missing from {}", method, methods);
    }
    let headers = response.header(header::ACCESS_CONTROL_ALLOW_HEADERS);
    let headers = headers.to_str().unwrap().to_ascii_lowercase();
    assert!(headers.contains("authorization"));
    assert!(headers.contains("content-type"));
}

////////////////////////////////////////////// Collaborators //////////////////////////////////////////////

#[tokio::test]
async fn seeded_users_are_listed_without_hashes() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    api.seed().await;

    for path in ["/api/v1/user/users", "/api/v1/users"] {
        let response = api.server.get(path).await;
        response.assert_status_ok();
        let users = response.json::<Vec<Value>>();
        assert_eq!(users.len(), 2, "path {}", path);
        let mut emails: Vec<&str> = users.iter().map(|u| u["email"].as_str().unwrap()).collect();
        emails.sort();
        assert_eq!(emails, vec!["admin@example.com", "owner@example.com"]);
        for user in &users {
            assert!(user.get("password_hash").is_none());
        }
    }

    let missing = api.server.get("/api/v1/user/users/9999").await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["message"], "User not found");
}

#[tokio::test]
async fn login_verifies_seeded_credentials() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    api.seed().await;

    let accepted = api
        .server
        .post("/api/v1/auth/login")
        .json(&json!({"email": "owner@example.com", "password": "12345"}))
        .await;
    accepted.assert_status_ok();
    let body = accepted.json::<Value>();
    assert_eq!(body["status"], "success");
    assert_eq!(body["user"]["role"], "Owner");
    assert!(body["user"].get("password_hash").is_none());

    for (email, password) in [
        ("owner@example.com", "wrong"),
        ("nobody@example.com", "12345"),
    ] {
        let rejected = api
            .server
            .post("/api/v1/auth/login")
            .json(&json!({"email": email, "password": password}))
            .await;
        rejected.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            rejected.json::<Value>(),
            json!({"status": "error", "message": "Invalid email or password"})
        );
    }
}

#[tokio::test]
async fn documents_round_trip_through_a_collection() {
    let api = ApiTestServer::new(RuntimeMode::Production);

    let created = api
        .server
        .post("/api/v1/meal")
        .json(&json!({"dish": "congee", "calories": 320}))
        .await;
    created.assert_status(StatusCode::CREATED);
    let id = created.json::<Value>()["id"].as_i64().unwrap();
    let path = format!("/api/v1/meal/{}", id);

    let fetched = api.server.get(&path).await.json::<Value>();
    assert_eq!(fetched["body"], json!({"dish": "congee", "calories": 320}));

    let replaced = api
        .server
        .put(&path)
        .json(&json!({"dish": "rice"}))
        .await
        .json::<Value>();
    assert_eq!(replaced["body"], json!({"dish": "rice"}));

    let listed = api.server.get("/api/v1/meal").await.json::<Vec<Value>>();
    assert_eq!(listed.len(), 1);

    // collections do not leak into each other
    let elsewhere = api.server.get(&format!("/api/v1/patient/{}", id)).await;
    elsewhere.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(elsewhere.json::<Value>()["message"], "Document not found");

    api.server
        .delete(&path)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    api.server
        .get(&path)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert!(api.documents.list("meals").await.unwrap().is_empty());
}

//////////////////////////////////////////// Unreadable requests ////////////////////////////////////////////

/// A malformed body, a wrong content type, an oversized body and a non-numeric id
async fn unreadable_requests(server: &TestServer) -> Vec<(&'static str, TestResponse)> {
    let malformed = server
        .post("/api/v1/meal")
        .bytes(Bytes::from_static(b"{not json"))
        .content_type("application/json")
        .await;
    let plain_text = server.post("/api/v1/meal").text("dish=congee").await;
    let oversized = server
        .post("/api/v1/meal")
        .json(&json!({"notes": "x".repeat(200 * 1024)}))
        .await;
    let bad_id = server.get("/api/v1/meal/not-a-number").await;
    vec![
        ("malformed", malformed),
        ("plain text", plain_text),
        ("oversized", oversized),
        ("bad id", bad_id),
    ]
}

#[tokio::test]
async fn unreadable_requests_hide_detail_in_production() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    for (case, response) in unreadable_requests(&api.server).await {
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.json::<Value>(),
            json!({"status": "error", "message": "Something went wrong!", "error": {}}),
            "case {}",
            case
        );
    }
    assert!(api.documents.list("meals").await.unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_requests_carry_detail_in_development() {
    let api = ApiTestServer::new(RuntimeMode::Development);
    let expected = ["JSON", "Content-Type", "length limit", "parse"];
    let responses = unreadable_requests(&api.server).await;
    for ((case, response), fragment) in responses.into_iter().zip(expected) {
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.json::<Value>();
        assert_eq!(body["status"], "error", "case {}", case);
        assert_eq!(body["message"], "Something went wrong!", "case {}", case);
        let detail = body["error"].as_str().unwrap_or_default();
        assert!(detail.contains(fragment), "case {}: {:?}", case, detail);
    }
}

#[tokio::test]
async fn malformed_login_is_an_envelope() {
    let api = ApiTestServer::new(RuntimeMode::Production);
    let response = api
        .server
        .post("/api/v1/auth/login")
        .json(&json!({"email": "owner@example.com"}))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["error"], json!({}));
}
