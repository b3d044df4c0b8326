//! `GET`/`POST` endpoints shared by tags and ingredients.

use axum::{
    Json, Router,
    extract::{
        Extension, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    routing::get,
};
use sea_orm::IntoActiveModel;
use std::sync::Arc;
use tracing::info;

use crate::db::services::attribute_service::{self, OwnedAttribute};
use crate::web::models::AuthenticatedUser;
use crate::web::models::recipe_models::{AttributeListParams, AttributeRequest, AttributeResponse};
use crate::web::{AppError, AppState, error::FieldErrors};

pub const MAX_NAME_LEN: usize = 255;

pub fn create_attribute_router<E>(path: &str) -> Router<Arc<AppState>>
where
    E: OwnedAttribute,
    E::ActiveModel: Send,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
{
    Router::new().route(path, get(list_attributes::<E>).post(create_attribute::<E>))
}

fn validate_name(name: Option<&str>) -> Result<String, AppError> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(AppError::Validation(FieldErrors::single(
            "name",
            "This field may not be blank.",
        )));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(FieldErrors::single(
            "name",
            format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
        )));
    }
    Ok(name.to_string())
}

async fn list_attributes<E>(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    params: Result<Query<AttributeListParams>, QueryRejection>,
) -> Result<Json<Vec<AttributeResponse>>, AppError>
where
    E: OwnedAttribute,
{
    let Query(params) = params?;
    let assigned_only = params.assigned_only.unwrap_or(0) != 0;

    let items = attribute_service::list_owned::<E, _>(&app_state.db_pool, authenticated_user.id, assigned_only)
        .await?
        .into_iter()
        .map(|model| {
            let (id, name) = E::into_id_name(model);
            AttributeResponse { id, name }
        })
        .collect();
    Ok(Json(items))
}

async fn create_attribute<E>(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<AttributeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AttributeResponse>), AppError>
where
    E: OwnedAttribute,
    E::ActiveModel: Send,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
{
    let Json(payload) = payload?;
    let name = validate_name(payload.name.as_deref())?;

    let model = attribute_service::create_owned::<E, _>(&app_state.db_pool, authenticated_user.id, name).await?;
    let (id, name) = E::into_id_name(model);
    info!(user_id = authenticated_user.id, id, kind = E::KIND, "Attribute created.");
    Ok((StatusCode::CREATED, Json(AttributeResponse { id, name })))
}

#[cfg(test)]
mod tests {
    use crate::db::entities::{ingredient, tag};
    use crate::db::services::attribute_service;
    use crate::test_support::{TestApp, create_user};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn requires_authentication() {
        let app = TestApp::new().await;
        for uri in ["/api/recipe/tags/", "/api/recipe/ingredients/"] {
            let (status, _) = app.request(Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn lists_only_own_tags_by_name_descending() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "user@example.com").await;
        let other = create_user(&app.db, "other@example.com").await;
        attribute_service::create_owned::<tag::Entity, _>(&app.db, user.id, "Dessert".into()).await.unwrap();
        attribute_service::create_owned::<tag::Entity, _>(&app.db, user.id, "Vegan".into()).await.unwrap();
        attribute_service::create_owned::<tag::Entity, _>(&app.db, other.id, "Fruity".into()).await.unwrap();

        let token = app.token_for(&user);
        let (status, body) = app.request(Method::GET, "/api/recipe/tags/", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Vegan", "Dessert"]);
    }

    #[tokio::test]
    async fn creates_ingredient_for_caller() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "user@example.com").await;
        let token = app.token_for(&user);

        let (status, body) = app
            .request(
                Method::POST,
                "/api/recipe/ingredients/",
                Some(&token),
                Some(json!({ "name": "Cabbage", "user_id": 999 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Cabbage");

        let mine = attribute_service::list_owned::<ingredient::Entity, _>(&app.db, user.id, false)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, body["id"].as_i64().unwrap() as i32);
    }

    #[tokio::test]
    async fn blank_name_is_rejected_without_persisting() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "user@example.com").await;
        let token = app.token_for(&user);

        for body in [json!({ "name": "" }), json!({ "name": "   " }), json!({})] {
            let (status, response) = app
                .request(Method::POST, "/api/recipe/tags/", Some(&token), Some(body))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(response["fields"]["name"].is_array());
        }
        let tags = attribute_service::list_owned::<tag::Entity, _>(&app.db, user.id, false)
            .await
            .unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn assigned_only_filters_and_deduplicates() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "user@example.com").await;
        let token = app.token_for(&user);

        let eggs = attribute_service::create_owned::<ingredient::Entity, _>(&app.db, user.id, "Eggs".into())
            .await
            .unwrap();
        attribute_service::create_owned::<ingredient::Entity, _>(&app.db, user.id, "Lentils".into())
            .await
            .unwrap();

        for title in ["Eggs Benedict", "Herb Eggs"] {
            let (status, _) = app
                .request(
                    Method::POST,
                    "/api/recipe/recipes/",
                    Some(&token),
                    Some(json!({
                        "title": title,
                        "time_minutes": 10,
                        "price": "5.00",
                        "ingredients": [eggs.id],
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = app
            .request(Method::GET, "/api/recipe/ingredients/?assigned_only=1", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{ "id": eggs.id, "name": "Eggs" }]));

        let (_, body) = app
            .request(Method::GET, "/api/recipe/ingredients/?assigned_only=0", Some(&token), None)
            .await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_numeric_assigned_only_is_a_bad_request() {
        let app = TestApp::new().await;
        let user = create_user(&app.db, "user@example.com").await;
        let token = app.token_for(&user);

        let (status, _) = app
            .request(Method::GET, "/api/recipe/tags/?assigned_only=yes", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
