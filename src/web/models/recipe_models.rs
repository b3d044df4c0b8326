//! Request and response shapes of the `/api/recipe` endpoints.
//!
//! Recipes have two representations: the list shape references tags and
//! ingredients by id, the detail shape nests them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct AttributeRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeResponse {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AttributeListParams {
    /// Any non-zero value restricts the list to entities used by a recipe.
    pub assigned_only: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipeListParams {
    /// Comma separated tag ids.
    pub tags: Option<String>,
    /// Comma separated ingredient ids.
    pub ingredients: Option<String>,
}

/// A tag or ingredient named in a recipe payload, either by id or by the
/// name of one of the caller's existing entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeRef {
    Id(i32),
    Name(String),
}

impl std::fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeRef::Id(id) => write!(f, "{id}"),
            AttributeRef::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Body of create (POST), full update (PUT) and partial update (PATCH).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RecipePayload {
    pub title: Option<String>,
    pub time_minutes: Option<i64>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<AttributeRef>>,
    pub ingredients: Option<Vec<AttributeRef>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub id: i32,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<i32>,
    pub ingredients: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDetailResponse {
    pub id: i32,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<AttributeResponse>,
    pub ingredients: Vec<AttributeResponse>,
    pub image: Option<String>,
}

pub fn price_from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
