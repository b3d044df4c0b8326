use axum::{
    Router,
    http::{Method, header},
    middleware as axum_middleware,
    routing::get,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::entities::{ingredient, tag};
use crate::server::config::ServerConfig;
use crate::services::media_service::MediaStore;
use crate::web::{
    middleware::auth,
    routes::{attribute_routes, recipe_routes, user_routes},
};

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub config: Arc<ServerConfig>,
    pub media: MediaStore,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Router {
    let media = MediaStore::new(config.media_root.clone());
    let media_root = media.root().to_path_buf();
    let max_upload_bytes = config.max_upload_bytes;

    let app_state = Arc::new(AppState {
        db_pool,
        config,
        media,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let recipe_api = Router::new()
        .merge(attribute_routes::create_attribute_router::<tag::Entity>("/tags/"))
        .merge(attribute_routes::create_attribute_router::<ingredient::Entity>("/ingredients/"))
        .merge(recipe_routes::create_recipe_router(max_upload_bytes))
        .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth));

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest(
            "/api/users",
            user_routes::create_public_router().merge(
                user_routes::create_protected_router()
                    .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
            ),
        )
        .nest("/api/recipe", recipe_api)
        .nest_service("/media", ServeDir::new(media_root))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
