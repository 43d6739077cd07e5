use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use crudforge_auth::{hash_password, JwtClaims};
use crudforge_core::{Document, Store};
use crudforge_infra::InMemoryStore;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let store = Arc::new(InMemoryStore::new("users"));
        let app = crudforge_api::app::build_app(store.clone(), JWT_SECRET).expect("routes build");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, store, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn seed(&self, value: Value) -> Document {
        let doc = value.as_object().expect("object").clone();
        self.store.create(doc).await.expect("seed")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, subject: &str) -> String {
    let claims = JwtClaims::new(subject, Utc::now(), ChronoDuration::minutes(10));

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn seed_students(srv: &TestServer) {
    for (id, name, role) in [
        ("s1", "ali", "student"),
        ("s2", "sara", "teacher"),
        ("s3", "omar", "student"),
        ("s4", "hina", "student"),
        ("s5", "zaid", "student"),
    ] {
        srv.seed(json!({ "_id": id, "name": name, "role": role })).await;
    }
}

#[tokio::test]
async fn health_and_welcome() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("Welcome"));
}

#[tokio::test]
async fn list_filters_and_pages() {
    let srv = TestServer::spawn().await;
    seed_students(&srv).await;

    let client = reqwest::Client::new();
    let res = client
        .get(srv.url("/users?limit=2&page=2&role=student"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["total"], 4);
    assert_eq!(body["page"], 2);
    assert_eq!(body["limit"], 2);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["s3", "s1"]);
}

#[tokio::test]
async fn list_with_defaults_sort_and_projection() {
    let srv = TestServer::spawn().await;
    seed_students(&srv).await;
    let client = reqwest::Client::new();

    let body: Value = client.get(srv.url("/users")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["limit"], 10);
    assert_eq!(body["page"], 1);
    assert_eq!(body["data"][0]["_id"], "s5");

    let body: Value = client
        .get(srv.url("/users?sort=name&fields=-role"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0], json!({ "_id": "s1", "name": "ali" }));
    assert_eq!(body["total"], 5);
}

#[tokio::test]
async fn invalid_page_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/users?page=zero")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "page must be a positive integer" }));
}

#[tokio::test]
async fn create_then_get() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/users"))
        .json(&json!({ "name": "noor", "email": "noor@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["_id"].as_str().unwrap();

    let res = client.get(srv.url(&format!("/users/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: Value = res.json().await.unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn missing_record_is_404() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/users/unknown")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Item not found" }));
}

#[tokio::test]
async fn update_requires_bearer_token() {
    let srv = TestServer::spawn().await;
    srv.seed(json!({ "_id": "u1", "name": "ali" })).await;
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url("/users/u1"))
        .json(&json!({ "name": "mallory" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "No token provided" }));

    let res = client
        .put(srv.url("/users/u1"))
        .bearer_auth("invalid_token")
        .json(&json!({ "name": "mallory" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let stored = srv.store.find_by_id("u1").await.unwrap().unwrap();
    assert_eq!(stored["name"], "ali");
}

#[tokio::test]
async fn update_and_delete_with_token() {
    let srv = TestServer::spawn().await;
    srv.seed(json!({ "_id": "u1", "name": "ali", "role": "student" })).await;
    let token = mint_jwt(JWT_SECRET, "u1");
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url("/users/u1"))
        .bearer_auth(&token)
        .json(&json!({ "role": "alumni" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "_id": "u1", "name": "ali", "role": "alumni" }));

    let res = client
        .delete(srv.url("/users/u1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "message": "Item deleted successfully" }));

    let res = client
        .delete(srv.url("/users/u1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let srv = TestServer::spawn().await;
    srv.seed(json!({ "_id": "u1", "name": "ali" })).await;
    let client = reqwest::Client::new();

    let res = client
        .delete(srv.url("/users/u1"))
        .bearer_auth(mint_jwt("other-secret", "u1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Failed to authenticate token" }));
    assert_eq!(srv.store.len(), 1);
}

#[tokio::test]
async fn login_then_me() {
    let srv = TestServer::spawn().await;
    srv.seed(json!({
        "_id": "u1",
        "email": "ali@example.com",
        "password": hash_password("hunter2").unwrap(),
    }))
    .await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/users/login"))
        .json(&json!({ "email": "ali@example.com", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let header = res
        .headers()
        .get(reqwest::header::AUTHORIZATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = res.json().await.unwrap();
    let token = body["token"].as_str().unwrap();
    assert_eq!(header, format!("Bearer {token}"));

    let res = client.get(srv.url("/users/me")).bearer_auth(token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["subject"], "u1");

    let res = client.get(srv.url("/users/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn password_hashes_are_not_served() {
    let srv = TestServer::spawn().await;
    srv.seed(json!({
        "_id": "u1",
        "email": "ali@example.com",
        "password": hash_password("hunter2").unwrap(),
    }))
    .await;
    let client = reqwest::Client::new();

    let body: Value = client.get(srv.url("/users")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["data"][0], json!({ "_id": "u1", "email": "ali@example.com" }));

    let body: Value = client
        .get(srv.url("/users?fields=password"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0], json!({ "_id": "u1" }));

    let body: Value = client.get(srv.url("/users/u1")).send().await.unwrap().json().await.unwrap();
    assert_eq!(body, json!({ "_id": "u1", "email": "ali@example.com" }));

    // Hidden from responses, still usable for login.
    let res = client
        .post(srv.url("/users/login"))
        .json(&json!({ "email": "ali@example.com", "password": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_with_wrong_password_is_401() {
    let srv = TestServer::spawn().await;
    srv.seed(json!({
        "_id": "u1",
        "email": "ali@example.com",
        "password": hash_password("hunter2").unwrap(),
    }))
    .await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/users/login"))
        .json(&json!({ "email": "ali@example.com", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "ok": false, "message": "Invalid email or password" }));
}
