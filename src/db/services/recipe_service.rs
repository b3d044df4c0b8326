use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbConn, DbErr, EntityTrait, IntoActiveModel,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::{BTreeSet, HashMap};

use crate::db::entities::{ingredient, prelude::Recipe, recipe, tag};
use crate::db::services::attribute_service::{self, OwnedAttribute};
use crate::web::error::{AppError, FieldErrors};
use crate::web::models::recipe_models::{
    AttributeRef, AttributeResponse, RecipeDetailResponse, RecipePayload, RecipeResponse,
    price_from_cents,
};

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_LINK_LEN: usize = 255;
/// Prices have at most five digits, two of them after the decimal point.
pub const MAX_PRICE_CENTS: i64 = 99_999;

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Recipe not found: {0}")]
    NotFound(i32),
    #[error("Invalid recipe: {0}")]
    Invalid(FieldErrors),
}

impl From<RecipeError> for AppError {
    fn from(err: RecipeError) -> Self {
        match err {
            RecipeError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            RecipeError::NotFound(_) => AppError::NotFound("Recipe not found.".to_string()),
            RecipeError::Invalid(fields) => AppError::Validation(fields),
        }
    }
}

/// Scalar recipe fields after validation. `None` means "leave unchanged".
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecipeFields {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price_cents: Option<i64>,
    pub link: Option<String>,
}

/// Filters of the recipe list. Empty vectors mean "no filter".
#[derive(Debug, Default, Clone)]
pub struct RecipeFilter {
    pub tag_ids: Vec<i32>,
    pub ingredient_ids: Vec<i32>,
}

/// Converts a non-negative price with at most two decimal places into cents.
pub fn price_to_cents(price: Decimal) -> Result<i64, String> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err("Ensure this value is greater than or equal to 0.".to_string());
    }
    if price.normalize().scale() > 2 {
        return Err("Ensure that there are no more than 2 decimal places.".to_string());
    }
    let cents = price
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .filter(|cents| *cents <= MAX_PRICE_CENTS)
        .ok_or_else(|| "Ensure that there are no more than 5 digits in total.".to_string())?;
    Ok(cents)
}

/// Validates a recipe payload. With `partial` unset (create, PUT) title,
/// time and price are required.
pub fn validate_fields(payload: &RecipePayload, partial: bool) -> Result<RecipeFields, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut fields = RecipeFields::default();

    match payload.title.as_deref().map(str::trim) {
        Some("") => errors.add("title", "This field may not be blank."),
        Some(title) if title.chars().count() > MAX_TITLE_LEN => errors.add(
            "title",
            format!("Ensure this field has no more than {MAX_TITLE_LEN} characters."),
        ),
        Some(title) => fields.title = Some(title.to_string()),
        None if !partial => errors.add("title", "This field is required."),
        None => {}
    }

    match payload.time_minutes {
        Some(minutes) if minutes <= 0 => {
            errors.add("time_minutes", "Ensure this value is greater than 0.")
        }
        Some(minutes) => match i32::try_from(minutes) {
            Ok(minutes) => fields.time_minutes = Some(minutes),
            Err(_) => errors.add("time_minutes", "Ensure this value is a valid integer."),
        },
        None if !partial => errors.add("time_minutes", "This field is required."),
        None => {}
    }

    match payload.price {
        Some(price) => match price_to_cents(price) {
            Ok(cents) => fields.price_cents = Some(cents),
            Err(message) => errors.add("price", message),
        },
        None if !partial => errors.add("price", "This field is required."),
        None => {}
    }

    match payload.link.as_deref().map(str::trim) {
        Some(link) if link.chars().count() > MAX_LINK_LEN => errors.add(
            "link",
            format!("Ensure this field has no more than {MAX_LINK_LEN} characters."),
        ),
        Some(link) => fields.link = Some(link.to_string()),
        // A full update resets an omitted link to blank.
        None if !partial => fields.link = Some(String::new()),
        None => {}
    }

    if errors.is_empty() { Ok(fields) } else { Err(errors) }
}

/// Resolves references to the caller's attributes into ids. Unknown ids,
/// unknown names and other users' rows are reported under `field`.
async fn resolve_refs<E, C>(
    db: &C,
    user_id: i32,
    refs: &[AttributeRef],
    field: &str,
    errors: &mut FieldErrors,
) -> Result<Vec<i32>, DbErr>
where
    E: OwnedAttribute,
    C: ConnectionTrait,
{
    let ids: Vec<i32> = refs
        .iter()
        .filter_map(|r| match r {
            AttributeRef::Id(id) => Some(*id),
            AttributeRef::Name(_) => None,
        })
        .collect();
    let names: Vec<String> = refs
        .iter()
        .filter_map(|r| match r {
            AttributeRef::Name(name) => Some(name.trim().to_string()),
            AttributeRef::Id(_) => None,
        })
        .collect();

    let known_ids: BTreeSet<i32> = attribute_service::find_owned_by_ids::<E, _>(db, user_id, &ids)
        .await?
        .into_iter()
        .map(|model| E::into_id_name(model).0)
        .collect();

    // Oldest first, so the first id seen for a duplicated name wins.
    let mut by_name: HashMap<String, i32> = HashMap::new();
    for model in attribute_service::find_owned_by_names::<E, _>(db, user_id, &names).await? {
        let (id, name) = E::into_id_name(model);
        by_name.entry(name).or_insert(id);
    }

    let mut resolved = BTreeSet::new();
    for reference in refs {
        let id = match reference {
            AttributeRef::Id(id) => known_ids.contains(id).then_some(*id),
            AttributeRef::Name(name) => by_name.get(name.trim()).copied(),
        };
        match id {
            Some(id) => {
                resolved.insert(id);
            }
            None => errors.add(
                field,
                format!("Invalid {} \"{reference}\" - object does not exist.", E::KIND),
            ),
        }
    }
    Ok(resolved.into_iter().collect())
}

fn to_response(
    model: recipe::Model,
    tags: &HashMap<i32, Vec<i32>>,
    ingredients: &HashMap<i32, Vec<i32>>,
) -> RecipeResponse {
    RecipeResponse {
        id: model.id,
        tags: tags.get(&model.id).cloned().unwrap_or_default(),
        ingredients: ingredients.get(&model.id).cloned().unwrap_or_default(),
        title: model.title,
        time_minutes: model.time_minutes,
        price: price_from_cents(model.price_cents),
        link: model.link,
    }
}

pub struct RecipeService;

impl RecipeService {
    async fn find_owned<C: ConnectionTrait>(
        db: &C,
        recipe_id: i32,
        user_id: i32,
    ) -> Result<recipe::Model, RecipeError> {
        Recipe::find_by_id(recipe_id)
            .filter(recipe::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or(RecipeError::NotFound(recipe_id))
    }

    async fn list_shape<C: ConnectionTrait>(
        db: &C,
        recipes: Vec<recipe::Model>,
    ) -> Result<Vec<RecipeResponse>, RecipeError> {
        let ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
        let tags = attribute_service::attached_ids::<tag::Entity, _>(db, &ids).await?;
        let ingredients = attribute_service::attached_ids::<ingredient::Entity, _>(db, &ids).await?;
        Ok(recipes
            .into_iter()
            .map(|r| to_response(r, &tags, &ingredients))
            .collect())
    }

    /// Lists the caller's recipes, newest first, in the list shape.
    pub async fn list_recipes(
        db: &DbConn,
        user_id: i32,
        filter: &RecipeFilter,
    ) -> Result<Vec<RecipeResponse>, RecipeError> {
        let mut query = Recipe::find().filter(recipe::Column::UserId.eq(user_id));
        if !filter.tag_ids.is_empty() {
            query = query.filter(recipe::Column::Id.in_subquery(
                attribute_service::recipes_with_any::<tag::Entity>(user_id, &filter.tag_ids),
            ));
        }
        if !filter.ingredient_ids.is_empty() {
            query = query.filter(recipe::Column::Id.in_subquery(
                attribute_service::recipes_with_any::<ingredient::Entity>(user_id, &filter.ingredient_ids),
            ));
        }
        let recipes = query.order_by_desc(recipe::Column::Id).all(db).await?;
        Self::list_shape(db, recipes).await
    }

    /// Full representation of one of the caller's recipes.
    pub async fn get_recipe_detail(
        db: &DbConn,
        recipe_id: i32,
        user_id: i32,
    ) -> Result<RecipeDetailResponse, RecipeError> {
        let model = Self::find_owned(db, recipe_id, user_id).await?;
        Self::detail_shape(db, model).await
    }

    async fn detail_shape<C: ConnectionTrait>(
        db: &C,
        model: recipe::Model,
    ) -> Result<RecipeDetailResponse, RecipeError> {
        let tags = model
            .find_related(tag::Entity)
            .order_by_asc(tag::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(|t| AttributeResponse { id: t.id, name: t.name })
            .collect();
        let ingredients = model
            .find_related(ingredient::Entity)
            .order_by_asc(ingredient::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(|i| AttributeResponse { id: i.id, name: i.name })
            .collect();

        Ok(RecipeDetailResponse {
            id: model.id,
            title: model.title,
            time_minutes: model.time_minutes,
            price: price_from_cents(model.price_cents),
            link: model.link,
            tags,
            ingredients,
            image: model.image,
        })
    }

    /// Validates the payload, including that every referenced tag and
    /// ingredient belongs to the caller.
    async fn validate<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        payload: &RecipePayload,
        partial: bool,
    ) -> Result<(RecipeFields, Option<Vec<i32>>, Option<Vec<i32>>), RecipeError> {
        let (fields, mut errors) = match validate_fields(payload, partial) {
            Ok(fields) => (fields, FieldErrors::new()),
            Err(errors) => (RecipeFields::default(), errors),
        };

        let tag_ids = match &payload.tags {
            Some(refs) => Some(resolve_refs::<tag::Entity, _>(db, user_id, refs, "tags", &mut errors).await?),
            None => None,
        };
        let ingredient_ids = match &payload.ingredients {
            Some(refs) => Some(
                resolve_refs::<ingredient::Entity, _>(db, user_id, refs, "ingredients", &mut errors).await?,
            ),
            None => None,
        };

        if errors.is_empty() {
            Ok((fields, tag_ids, ingredient_ids))
        } else {
            Err(RecipeError::Invalid(errors))
        }
    }

    async fn replace_attributes<C: ConnectionTrait>(
        db: &C,
        recipe_id: i32,
        tag_ids: Option<Vec<i32>>,
        ingredient_ids: Option<Vec<i32>>,
    ) -> Result<(), DbErr> {
        if let Some(ids) = tag_ids {
            attribute_service::replace_links::<tag::Entity, _>(db, recipe_id, &ids).await?;
        }
        if let Some(ids) = ingredient_ids {
            attribute_service::replace_links::<ingredient::Entity, _>(db, recipe_id, &ids).await?;
        }
        Ok(())
    }

    /// Creates a recipe owned by `user_id` and returns it in the list shape.
    pub async fn create_recipe(
        db: &DbConn,
        user_id: i32,
        payload: &RecipePayload,
    ) -> Result<RecipeResponse, RecipeError> {
        let (fields, tag_ids, ingredient_ids) = Self::validate(db, user_id, payload, false).await?;

        let txn = db.begin().await?;
        let now = Utc::now();
        let model = recipe::ActiveModel {
            user_id: Set(user_id),
            title: Set(fields.title.unwrap_or_default()),
            time_minutes: Set(fields.time_minutes.unwrap_or_default()),
            price_cents: Set(fields.price_cents.unwrap_or_default()),
            link: Set(fields.link.unwrap_or_default()),
            image: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        Self::replace_attributes(&txn, model.id, tag_ids, ingredient_ids).await?;
        let mut shaped = Self::list_shape(&txn, vec![model]).await?;
        txn.commit().await?;

        shaped.pop().ok_or(RecipeError::DbErr(DbErr::RecordNotInserted))
    }

    /// Updates one of the caller's recipes. `partial` selects PATCH
    /// semantics; with PUT the scalar fields are required. Returns the list
    /// shape.
    pub async fn update_recipe(
        db: &DbConn,
        recipe_id: i32,
        user_id: i32,
        payload: &RecipePayload,
        partial: bool,
    ) -> Result<RecipeResponse, RecipeError> {
        let existing = Self::find_owned(db, recipe_id, user_id).await?;
        let (fields, tag_ids, ingredient_ids) = Self::validate(db, user_id, payload, partial).await?;

        let txn = db.begin().await?;
        let mut active: recipe::ActiveModel = existing.into_active_model();
        if let Some(title) = fields.title {
            active.title = Set(title);
        }
        if let Some(minutes) = fields.time_minutes {
            active.time_minutes = Set(minutes);
        }
        if let Some(cents) = fields.price_cents {
            active.price_cents = Set(cents);
        }
        if let Some(link) = fields.link {
            active.link = Set(link);
        }
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;
        Self::replace_attributes(&txn, model.id, tag_ids, ingredient_ids).await?;
        let mut shaped = Self::list_shape(&txn, vec![model]).await?;
        txn.commit().await?;

        shaped.pop().ok_or(RecipeError::NotFound(recipe_id))
    }

    /// Deletes one of the caller's recipes and returns the image path it
    /// held, if any, so the file can be removed.
    pub async fn delete_recipe(
        db: &DbConn,
        recipe_id: i32,
        user_id: i32,
    ) -> Result<Option<String>, RecipeError> {
        let existing = Self::find_owned(db, recipe_id, user_id).await?;
        let image = existing.image.clone();
        existing.delete(db).await?;
        Ok(image)
    }

    /// Checks that the recipe exists and belongs to the caller.
    pub async fn ensure_owned(db: &DbConn, recipe_id: i32, user_id: i32) -> Result<(), RecipeError> {
        Self::find_owned(db, recipe_id, user_id).await.map(|_| ())
    }

    /// Points the recipe at a newly stored image. Returns the detail shape
    /// and the path of the image it replaces.
    pub async fn set_image(
        db: &DbConn,
        recipe_id: i32,
        user_id: i32,
        image_path: String,
    ) -> Result<(RecipeDetailResponse, Option<String>), RecipeError> {
        let existing = Self::find_owned(db, recipe_id, user_id).await?;
        let previous = existing.image.clone();

        let mut active: recipe::ActiveModel = existing.into_active_model();
        active.image = Set(Some(image_path));
        active.updated_at = Set(Utc::now());
        let model = active.update(db).await?;

        Ok((Self::detail_shape(db, model).await?, previous))
    }
}
