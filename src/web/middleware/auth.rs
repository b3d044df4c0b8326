use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::db::services;
use crate::services::auth_service;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

/// Extracts the token from `Authorization: Bearer <t>` or `Authorization: Token <t>`.
fn token_from_header(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("Token "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(token_from_header)
        .ok_or_else(|| AppError::Unauthorized("Authentication credentials were not provided.".to_string()))?;

    let claims = auth_service::decode_token(token, &state.config.jwt_secret)?;

    let user = services::get_user_by_id(&state.db_pool, claims.user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = claims.user_id, "Token refers to a missing user.");
            AppError::Unauthorized("User not found.".to_string())
        })?;
    if !user.active {
        warn!(user_id = user.id, "Rejected token of an inactive user.");
        return Err(AppError::Unauthorized("User inactive or deleted.".to_string()));
    }

    req.extensions_mut().insert(AuthenticatedUser { id: user.id });
    Ok(next.run(req).await)
}
