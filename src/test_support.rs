//! Shared fixtures for the unit and HTTP tests.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::db::{self, entities::user};
use crate::server::config::ServerConfig;
use crate::services::auth_service;
use crate::web::create_axum_router;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_BCRYPT_COST: u32 = 4;
pub const TEST_PASSWORD: &str = "testpass123";

/// A fresh in-memory SQLite database with the schema applied. The pool is
/// limited to one connection so every query sees the same database.
pub async fn test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let conn = Database::connect(opt).await.unwrap();
    db::ensure_schema(&conn).await.unwrap();
    conn
}

pub fn test_config(media_root: &Path) -> ServerConfig {
    ServerConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        media_root: media_root.to_path_buf(),
        log_dir: "logs".to_string(),
        token_ttl_hours: 1,
        bcrypt_cost: TEST_BCRYPT_COST,
        max_upload_bytes: 1024 * 1024,
        db_connect_attempts: 1,
        db_connect_delay_ms: 0,
    }
}

/// Creates a regular user with [`TEST_PASSWORD`].
pub async fn create_user(db: &DatabaseConnection, email: &str) -> user::Model {
    auth_service::create_user(db, email, TEST_PASSWORD, TEST_BCRYPT_COST)
        .await
        .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub db: DatabaseConnection,
    pub media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = test_db().await;
        let media = tempfile::tempdir().unwrap();
        let router = create_axum_router(db.clone(), Arc::new(test_config(media.path())));
        Self { router, db, media }
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        auth_service::create_jwt_for_user(user, TEST_JWT_SECRET, 1)
            .unwrap()
            .token
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Sends a JSON request, authenticated with a bearer token when given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        self.raw_request(method, uri, token, &body).await
    }

    pub async fn raw_request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if !body.is_empty() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn request_with_authorization(
        &self,
        method: Method,
        uri: &str,
        authorization: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, authorization)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Posts a single-file multipart form.
    pub async fn upload(
        &self,
        uri: &str,
        token: &str,
        field: &str,
        filename: &str,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let boundary = "recipe-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Fetches raw bytes, for media files.
    pub async fn get_bytes(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }
}
