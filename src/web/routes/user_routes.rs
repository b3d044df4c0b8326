use axum::{
    Json, Router,
    extract::{Extension, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use crate::services::auth_service;
use crate::web::models::{
    AuthenticatedUser, LoginRequest, RegisterRequest, TokenResponse, UpdateProfileRequest,
    UserResponse,
};
use crate::web::{AppError, AppState};

/// Registration and token endpoints.
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create/", post(register_handler))
        .route("/token/", post(token_handler))
}

/// Profile endpoints; expects the auth middleware as a route layer.
pub fn create_protected_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/me/",
        get(me_handler).put(update_me_handler).patch(partial_update_me_handler),
    )
}

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let Json(payload) = payload?;
    let user = auth_service::register_user(&app_state.db_pool, payload, app_state.config.bcrypt_cost).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn token_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(payload) = payload?;
    let token = auth_service::login_user(
        &app_state.db_pool,
        payload,
        &app_state.config.jwt_secret,
        app_state.config.token_ttl_hours,
    )
    .await?;
    Ok(Json(token))
}

async fn me_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(auth_service::get_profile(&app_state.db_pool, auth_user.id).await?))
}

async fn update_me_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(payload) = payload?;
    update_me(&app_state, auth_user.id, payload, false).await
}

async fn partial_update_me_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(payload) = payload?;
    update_me(&app_state, auth_user.id, payload, true).await
}

async fn update_me(
    app_state: &AppState,
    user_id: i32,
    payload: UpdateProfileRequest,
    partial: bool,
) -> Result<Json<UserResponse>, AppError> {
    let user = auth_service::update_profile(
        &app_state.db_pool,
        user_id,
        payload,
        partial,
        app_state.config.bcrypt_cost,
    )
    .await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestApp, create_user};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn register_and_obtain_token() {
        let app = TestApp::new().await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/users/create/",
                None,
                Some(json!({ "email": "test@example.com", "password": "testpass123", "name": "Test" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "test@example.com");
        assert!(body.get("password").is_none());
        assert!(body.get("password_hash").is_none());

        let (status, body) = app
            .request(
                Method::POST,
                "/api/users/token/",
                None,
                Some(json!({ "email": "test@example.com", "password": "testpass123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn bad_credentials_are_a_bad_request() {
        let app = TestApp::new().await;
        create_user(&app.db, "test@example.com").await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/users/token/",
                None,
                Some(json!({ "email": "test@example.com", "password": "wrong" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["fields"]["non_field_errors"].is_array());
        assert!(body.get("token").is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let app = TestApp::new().await;
        let (status, _) = app
            .raw_request(Method::POST, "/api/users/create/", None, "{not json")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_requires_authentication() {
        let app = TestApp::new().await;
        let (status, _) = app.request(Method::GET, "/api/users/me/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .request(Method::GET, "/api/users/me/", Some("not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn retrieve_and_patch_profile() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "test@example.com").await;
        let token = app.token_for(&user);

        let (status, body) = app.request(Method::GET, "/api/users/me/", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], user.id);
        assert_eq!(body["email"], "test@example.com");

        let (status, body) = app
            .request(
                Method::PATCH,
                "/api/users/me/",
                Some(&token),
                Some(json!({ "name": "Updated", "password": "newpass123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Updated");

        let (status, _) = app
            .request(
                Method::POST,
                "/api/users/token/",
                None,
                Some(json!({ "email": "test@example.com", "password": "newpass123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn token_scheme_is_accepted() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "test@example.com").await;
        let header = format!("Token {}", app.token_for(&user));

        let (status, _) = app
            .request_with_authorization(Method::GET, "/api/users/me/", &header)
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}
