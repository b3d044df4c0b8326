//! Data access for users, owned attributes (tags and ingredients) and
//! recipes. Every function touching user-owned rows takes the owner's id and
//! filters on it; callers never see rows belonging to someone else.

pub mod attribute_service;
pub mod recipe_service;
pub mod user_service;

pub use attribute_service::*;
pub use recipe_service::{RecipeError, RecipeService};
pub use user_service::*;
