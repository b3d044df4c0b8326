use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Extension, Multipart, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use tracing::{error, info};

use crate::db::services::recipe_service::{RecipeFilter, RecipeService};
use crate::web::models::AuthenticatedUser;
use crate::web::models::recipe_models::{
    RecipeDetailResponse, RecipeListParams, RecipePayload, RecipeResponse,
};
use crate::web::{AppError, AppState, error::FieldErrors};

pub fn create_recipe_router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/recipes/", get(list_recipes_handler).post(create_recipe_handler))
        .route(
            "/recipes/{id}/",
            get(get_recipe_handler)
                .put(update_recipe_handler)
                .patch(partial_update_recipe_handler)
                .delete(delete_recipe_handler),
        )
        .route(
            "/recipes/{id}/upload-image/",
            post(upload_image_handler).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

/// Parses a comma separated id list such as `1,2,3`.
fn parse_ids(field: &str, raw: Option<&str>) -> Result<Vec<i32>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i32>().map_err(|_| {
                AppError::Validation(FieldErrors::single(
                    field,
                    format!("\"{part}\" is not a valid id."),
                ))
            })
        })
        .collect()
}

async fn list_recipes_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    params: Result<Query<RecipeListParams>, QueryRejection>,
) -> Result<Json<Vec<RecipeResponse>>, AppError> {
    let Query(params) = params?;
    let filter = RecipeFilter {
        tag_ids: parse_ids("tags", params.tags.as_deref())?,
        ingredient_ids: parse_ids("ingredients", params.ingredients.as_deref())?,
    };
    let recipes = RecipeService::list_recipes(&app_state.db_pool, authenticated_user.id, &filter).await?;
    Ok(Json(recipes))
}

async fn create_recipe_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<RecipeResponse>), AppError> {
    let Json(payload) = payload?;
    let recipe = RecipeService::create_recipe(&app_state.db_pool, authenticated_user.id, &payload).await?;
    info!(user_id = authenticated_user.id, recipe_id = recipe.id, "Recipe created.");
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(recipe_id): Path<i32>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    let recipe = RecipeService::get_recipe_detail(&app_state.db_pool, recipe_id, authenticated_user.id).await?;
    Ok(Json(recipe))
}

async fn update_recipe_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(recipe_id): Path<i32>,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<Json<RecipeResponse>, AppError> {
    let Json(payload) = payload?;
    let recipe =
        RecipeService::update_recipe(&app_state.db_pool, recipe_id, authenticated_user.id, &payload, false).await?;
    Ok(Json(recipe))
}

async fn partial_update_recipe_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(recipe_id): Path<i32>,
    payload: Result<Json<RecipePayload>, JsonRejection>,
) -> Result<Json<RecipeResponse>, AppError> {
    let Json(payload) = payload?;
    let recipe =
        RecipeService::update_recipe(&app_state.db_pool, recipe_id, authenticated_user.id, &payload, true).await?;
    Ok(Json(recipe))
}

async fn delete_recipe_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(recipe_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let image = RecipeService::delete_recipe(&app_state.db_pool, recipe_id, authenticated_user.id).await?;
    if let Some(image) = image {
        app_state.media.remove(&image).await;
    }
    info!(user_id = authenticated_user.id, recipe_id, "Recipe deleted.");
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(recipe_id): Path<i32>,
    mut multipart: Multipart,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    RecipeService::ensure_owned(&app_state.db_pool, recipe_id, authenticated_user.id).await?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let filename = field.file_name().map(str::to_string);
            let data = field.bytes().await?;
            upload = Some((filename, data.to_vec()));
            break;
        }
    }
    let (filename, data) = upload
        .filter(|(_, data)| !data.is_empty())
        .ok_or_else(|| AppError::Validation(FieldErrors::single("image", "No file was submitted.")))?;

    let stored = app_state
        .media
        .save_recipe_image(filename.as_deref(), data)
        .await?;

    let (recipe, previous) =
        match RecipeService::set_image(&app_state.db_pool, recipe_id, authenticated_user.id, stored.clone()).await {
            Ok(result) => result,
            Err(e) => {
                error!(recipe_id, error = %e, "Failed to record uploaded image.");
                app_state.media.remove(&stored).await;
                return Err(e.into());
            }
        };
    if let Some(previous) = previous {
        app_state.media.remove(&previous).await;
    }

    info!(user_id = authenticated_user.id, recipe_id, path = %stored, "Recipe image uploaded.");
    Ok(Json(recipe))
}
