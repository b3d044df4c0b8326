use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};

use crate::db::entities::user;

// --- User Service Functions ---

/// Attributes of a user row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Inserts a new active user.
pub async fn create_user<C: ConnectionTrait>(db: &C, new_user: NewUser) -> Result<user::Model, DbErr> {
    let now = Utc::now();
    user::ActiveModel {
        email: Set(new_user.email),
        name: Set(new_user.name),
        password_hash: Set(new_user.password_hash),
        active: Set(true),
        is_staff: Set(new_user.is_staff),
        is_superuser: Set(new_user.is_superuser),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Retrieves a user by their ID.
pub async fn get_user_by_id<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find_by_id(user_id).one(db).await
}

/// Retrieves a user by their (already normalized) email.
pub async fn get_user_by_email<C: ConnectionTrait>(db: &C, email: &str) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
}

/// Changes to apply to an existing user; `None` leaves a column untouched.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
}

pub async fn update_user<C: ConnectionTrait>(
    db: &C,
    existing: user::Model,
    changes: UserChanges,
) -> Result<user::Model, DbErr> {
    let mut active: user::ActiveModel = existing.into();
    if let Some(email) = changes.email {
        active.email = Set(email);
    }
    if let Some(name) = changes.name {
        active.name = Set(name);
    }
    if let Some(password_hash) = changes.password_hash {
        active.password_hash = Set(password_hash);
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await
}
