pub mod attribute_routes;
pub mod recipe_routes;
pub mod user_routes;
