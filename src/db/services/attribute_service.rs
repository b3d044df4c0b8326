//! Tags and ingredients share one contract: a labeled row owned by exactly
//! one user, attachable to that user's recipes through a join table.
//! [`OwnedAttribute`] captures the per-table details so the queries below are
//! written once.

use chrono::Utc;
use sea_orm::sea_query::{Expr, Query, SelectStatement};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
    QuerySelect, Set, ActiveModelTrait,
};
use std::collections::HashMap;

use crate::db::entities::{ingredient, recipe, recipe_ingredient, recipe_tag, tag};

pub trait OwnedAttribute: EntityTrait {
    /// Join entity linking this attribute to recipes.
    type Link: EntityTrait;

    /// Singular name used in logs and error messages.
    const KIND: &'static str;

    fn id_column() -> Self::Column;
    fn owner_column() -> Self::Column;
    fn name_column() -> Self::Column;
    fn link_recipe_column() -> <Self::Link as EntityTrait>::Column;
    fn link_attribute_column() -> <Self::Link as EntityTrait>::Column;

    fn new_owned(user_id: i32, name: String) -> Self::ActiveModel;
    fn new_link(recipe_id: i32, attribute_id: i32) -> <Self::Link as EntityTrait>::ActiveModel;
    fn into_id_name(model: Self::Model) -> (i32, String);

    /// Ids of attributes attached to at least one recipe owned by `user_id`.
    fn assigned_ids(user_id: i32) -> SelectStatement;
}

impl OwnedAttribute for tag::Entity {
    type Link = recipe_tag::Entity;
    const KIND: &'static str = "tag";

    fn id_column() -> tag::Column {
        tag::Column::Id
    }
    fn owner_column() -> tag::Column {
        tag::Column::UserId
    }
    fn name_column() -> tag::Column {
        tag::Column::Name
    }
    fn link_recipe_column() -> recipe_tag::Column {
        recipe_tag::Column::RecipeId
    }
    fn link_attribute_column() -> recipe_tag::Column {
        recipe_tag::Column::TagId
    }

    fn new_owned(user_id: i32, name: String) -> tag::ActiveModel {
        tag::ActiveModel {
            user_id: Set(user_id),
            name: Set(name),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
    }

    fn new_link(recipe_id: i32, attribute_id: i32) -> recipe_tag::ActiveModel {
        recipe_tag::ActiveModel {
            recipe_id: Set(recipe_id),
            tag_id: Set(attribute_id),
        }
    }

    fn into_id_name(model: tag::Model) -> (i32, String) {
        (model.id, model.name)
    }

    fn assigned_ids(user_id: i32) -> SelectStatement {
        Query::select()
            .column((recipe_tag::Entity, recipe_tag::Column::TagId))
            .from(recipe_tag::Entity)
            .inner_join(
                recipe::Entity,
                Expr::col((recipe::Entity, recipe::Column::Id))
                    .equals((recipe_tag::Entity, recipe_tag::Column::RecipeId)),
            )
            .and_where(Expr::col((recipe::Entity, recipe::Column::UserId)).eq(user_id))
            .to_owned()
    }
}

impl OwnedAttribute for ingredient::Entity {
    type Link = recipe_ingredient::Entity;
    const KIND: &'static str = "ingredient";

    fn id_column() -> ingredient::Column {
        ingredient::Column::Id
    }
    fn owner_column() -> ingredient::Column {
        ingredient::Column::UserId
    }
    fn name_column() -> ingredient::Column {
        ingredient::Column::Name
    }
    fn link_recipe_column() -> recipe_ingredient::Column {
        recipe_ingredient::Column::RecipeId
    }
    fn link_attribute_column() -> recipe_ingredient::Column {
        recipe_ingredient::Column::IngredientId
    }

    fn new_owned(user_id: i32, name: String) -> ingredient::ActiveModel {
        ingredient::ActiveModel {
            user_id: Set(user_id),
            name: Set(name),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
    }

    fn new_link(recipe_id: i32, attribute_id: i32) -> recipe_ingredient::ActiveModel {
        recipe_ingredient::ActiveModel {
            recipe_id: Set(recipe_id),
            ingredient_id: Set(attribute_id),
        }
    }

    fn into_id_name(model: ingredient::Model) -> (i32, String) {
        (model.id, model.name)
    }

    fn assigned_ids(user_id: i32) -> SelectStatement {
        Query::select()
            .column((recipe_ingredient::Entity, recipe_ingredient::Column::IngredientId))
            .from(recipe_ingredient::Entity)
            .inner_join(
                recipe::Entity,
                Expr::col((recipe::Entity, recipe::Column::Id))
                    .equals((recipe_ingredient::Entity, recipe_ingredient::Column::RecipeId)),
            )
            .and_where(Expr::col((recipe::Entity, recipe::Column::UserId)).eq(user_id))
            .to_owned()
    }
}

// --- Owned Attribute Functions ---

/// Lists the attributes owned by `user_id`, name descending. With
/// `assigned_only` only those used by one of the user's recipes are
/// returned; the subquery keeps each attribute to a single row no matter how
/// many recipes reference it.
pub async fn list_owned<E, C>(db: &C, user_id: i32, assigned_only: bool) -> Result<Vec<E::Model>, DbErr>
where
    E: OwnedAttribute,
    C: ConnectionTrait,
{
    let mut query = E::find().filter(E::owner_column().eq(user_id));
    if assigned_only {
        query = query.filter(E::id_column().in_subquery(E::assigned_ids(user_id)));
    }
    query
        .order_by_desc(E::name_column())
        .order_by_desc(E::id_column())
        .all(db)
        .await
}

/// Creates an attribute owned by `user_id`. The name is expected to be
/// validated already.
pub async fn create_owned<E, C>(db: &C, user_id: i32, name: String) -> Result<E::Model, DbErr>
where
    E: OwnedAttribute,
    E::ActiveModel: Send,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
    C: ConnectionTrait,
{
    E::new_owned(user_id, name).insert(db).await
}

/// Attributes owned by `user_id` whose id is in `ids`. Ids belonging to other
/// users are silently absent from the result.
pub async fn find_owned_by_ids<E, C>(db: &C, user_id: i32, ids: &[i32]) -> Result<Vec<E::Model>, DbErr>
where
    E: OwnedAttribute,
    C: ConnectionTrait,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    E::find()
        .filter(E::owner_column().eq(user_id))
        .filter(E::id_column().is_in(ids.iter().copied()))
        .all(db)
        .await
}

/// Attributes owned by `user_id` whose name is in `names`, oldest first.
pub async fn find_owned_by_names<E, C>(db: &C, user_id: i32, names: &[String]) -> Result<Vec<E::Model>, DbErr>
where
    E: OwnedAttribute,
    C: ConnectionTrait,
{
    if names.is_empty() {
        return Ok(Vec::new());
    }
    E::find()
        .filter(E::owner_column().eq(user_id))
        .filter(E::name_column().is_in(names.iter().cloned()))
        .order_by_asc(E::id_column())
        .all(db)
        .await
}

/// Maps each of `recipe_ids` to the ids of the attributes attached to it,
/// ascending. Recipes without attachments are absent from the map.
pub async fn attached_ids<E, C>(db: &C, recipe_ids: &[i32]) -> Result<HashMap<i32, Vec<i32>>, DbErr>
where
    E: OwnedAttribute,
    C: ConnectionTrait,
{
    if recipe_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let pairs: Vec<(i32, i32)> = E::Link::find()
        .select_only()
        .column(E::link_recipe_column())
        .column(E::link_attribute_column())
        .filter(E::link_recipe_column().is_in(recipe_ids.iter().copied()))
        .order_by_asc(E::link_attribute_column())
        .into_tuple()
        .all(db)
        .await?;

    let mut attached: HashMap<i32, Vec<i32>> = HashMap::new();
    for (recipe_id, attribute_id) in pairs {
        attached.entry(recipe_id).or_default().push(attribute_id);
    }
    Ok(attached)
}

/// Replaces the attributes attached to `recipe_id` with `attribute_ids`.
/// Meant to run inside the transaction that updates the recipe.
pub async fn replace_links<E, C>(db: &C, recipe_id: i32, attribute_ids: &[i32]) -> Result<(), DbErr>
where
    E: OwnedAttribute,
    <E::Link as EntityTrait>::ActiveModel: Send,
    <E::Link as EntityTrait>::Model: IntoActiveModel<<E::Link as EntityTrait>::ActiveModel>,
    C: ConnectionTrait,
{
    E::Link::delete_many()
        .filter(E::link_recipe_column().eq(recipe_id))
        .exec(db)
        .await?;

    if attribute_ids.is_empty() {
        return Ok(());
    }
    E::Link::insert_many(attribute_ids.iter().map(|&id| E::new_link(recipe_id, id)))
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Ids of the recipes of `user_id` that have at least one of `attribute_ids`
/// attached.
pub fn recipes_with_any<E: OwnedAttribute>(user_id: i32, attribute_ids: &[i32]) -> SelectStatement {
    Query::select()
        .column((E::Link::default(), E::link_recipe_column()))
        .from(E::Link::default())
        .inner_join(
            recipe::Entity,
            Expr::col((recipe::Entity, recipe::Column::Id))
                .equals((E::Link::default(), E::link_recipe_column())),
        )
        .and_where(Expr::col((recipe::Entity, recipe::Column::UserId)).eq(user_id))
        .and_where(
            Expr::col((E::Link::default(), E::link_attribute_column()))
                .is_in(attribute_ids.iter().copied()),
        )
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_user, test_db};

    async fn attach_tag(db: &sea_orm::DatabaseConnection, recipe_id: i32, tag_id: i32) {
        <tag::Entity as OwnedAttribute>::new_link(recipe_id, tag_id)
            .insert(db)
            .await
            .unwrap();
    }

    async fn recipe_for(db: &sea_orm::DatabaseConnection, user_id: i32, title: &str) -> recipe::Model {
        let now = Utc::now();
        recipe::ActiveModel {
            user_id: Set(user_id),
            title: Set(title.to_string()),
            time_minutes: Set(10),
            price_cents: Set(500),
            link: Set(String::new()),
            image: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner_and_sorted_descending() {
        let db = test_db().await;
        let alice = create_user(&db, "alice@example.com").await;
        let bob = create_user(&db, "bob@example.com").await;

        create_owned::<tag::Entity, _>(&db, alice.id, "Dessert".into()).await.unwrap();
        create_owned::<tag::Entity, _>(&db, alice.id, "Vegan".into()).await.unwrap();
        create_owned::<tag::Entity, _>(&db, bob.id, "Fruity".into()).await.unwrap();

        let names: Vec<String> = list_owned::<tag::Entity, _>(&db, alice.id, false)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Vegan", "Dessert"]);
    }

    #[tokio::test]
    async fn assigned_only_returns_each_used_attribute_once() {
        let db = test_db().await;
        let alice = create_user(&db, "alice@example.com").await;

        let breakfast = create_owned::<tag::Entity, _>(&db, alice.id, "Breakfast".into()).await.unwrap();
        create_owned::<tag::Entity, _>(&db, alice.id, "Lunch".into()).await.unwrap();

        let eggs = recipe_for(&db, alice.id, "Eggs Benedict").await;
        let porridge = recipe_for(&db, alice.id, "Porridge").await;
        attach_tag(&db, eggs.id, breakfast.id).await;
        attach_tag(&db, porridge.id, breakfast.id).await;

        let assigned = list_owned::<tag::Entity, _>(&db, alice.id, true).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, breakfast.id);
    }

    #[tokio::test]
    async fn assigned_only_ignores_other_users_recipes() {
        let db = test_db().await;
        let alice = create_user(&db, "alice@example.com").await;
        let bob = create_user(&db, "bob@example.com").await;

        let kale = create_owned::<ingredient::Entity, _>(&db, alice.id, "Kale".into()).await.unwrap();
        let bobs_recipe = recipe_for(&db, bob.id, "Smoothie").await;
        <ingredient::Entity as OwnedAttribute>::new_link(bobs_recipe.id, kale.id)
            .insert(&db)
            .await
            .unwrap();

        let assigned = list_owned::<ingredient::Entity, _>(&db, alice.id, true).await.unwrap();
        assert!(assigned.is_empty());
    }

    #[tokio::test]
    async fn find_by_ids_skips_foreign_rows() {
        let db = test_db().await;
        let alice = create_user(&db, "alice@example.com").await;
        let bob = create_user(&db, "bob@example.com").await;

        let salt = create_owned::<ingredient::Entity, _>(&db, alice.id, "Salt".into()).await.unwrap();
        let pepper = create_owned::<ingredient::Entity, _>(&db, bob.id, "Pepper".into()).await.unwrap();

        let found = find_owned_by_ids::<ingredient::Entity, _>(&db, alice.id, &[salt.id, pepper.id])
            .await
            .unwrap();
        assert_eq!(found, vec![salt]);
    }

    #[tokio::test]
    async fn replace_links_swaps_the_whole_set() {
        let db = test_db().await;
        let alice = create_user(&db, "alice@example.com").await;
        let a = create_owned::<tag::Entity, _>(&db, alice.id, "A".into()).await.unwrap();
        let b = create_owned::<tag::Entity, _>(&db, alice.id, "B".into()).await.unwrap();
        let c = create_owned::<tag::Entity, _>(&db, alice.id, "C".into()).await.unwrap();
        let soup = recipe_for(&db, alice.id, "Soup").await;

        replace_links::<tag::Entity, _>(&db, soup.id, &[a.id, b.id]).await.unwrap();
        replace_links::<tag::Entity, _>(&db, soup.id, &[c.id, b.id]).await.unwrap();

        let attached = attached_ids::<tag::Entity, _>(&db, &[soup.id]).await.unwrap();
        assert_eq!(attached.get(&soup.id), Some(&vec![b.id, c.id]));

        replace_links::<tag::Entity, _>(&db, soup.id, &[]).await.unwrap();
        let attached = attached_ids::<tag::Entity, _>(&db, &[soup.id]).await.unwrap();
        assert!(attached.is_empty());
    }
}
