//! SeaORM entities mapping the recipe schema.
//!
//! Tags and ingredients are attached to recipes through the explicit
//! `recipe_tags` / `recipe_ingredients` join tables.

pub mod user;
pub mod tag;
pub mod ingredient;
pub mod recipe;
pub mod recipe_tag;
pub mod recipe_ingredient;

pub mod prelude {
    pub use super::recipe::Entity as Recipe;
}
