use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{DatabaseConnection, DbErr, SqlErr};
use tracing::{info, warn};

use crate::db::entities::user;
use crate::db::services::{self, NewUser, UserChanges};
use crate::web::error::{AppError, FieldErrors};
use crate::web::models::{Claims, LoginRequest, RegisterRequest, TokenResponse, UpdateProfileRequest, UserResponse};

pub const MIN_PASSWORD_LEN: usize = 5;
pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_NAME_LEN: usize = 255;
const EMAIL_TAKEN: &str = "user with this email already exists.";

/// Trims the address and lowercases the domain part; the local part is kept
/// as typed.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .map_err(|e| AppError::InternalServerError(format!("Hashing task failed: {e}")))?
        .map_err(|e| AppError::PasswordHashingError(e.to_string()))
}

async fn verify_password(password: String, password_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify(password, &password_hash))
        .await
        .map_err(|e| AppError::InternalServerError(format!("Verification task failed: {e}")))?
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))
}

fn validate_email(email: &str, errors: &mut FieldErrors) {
    if email.is_empty() {
        errors.add("email", "This field may not be blank.");
    } else if email.chars().count() > MAX_EMAIL_LEN {
        errors.add("email", format!("Ensure this field has no more than {MAX_EMAIL_LEN} characters."));
    } else if !looks_like_email(email) {
        errors.add("email", "Enter a valid email address.");
    }
}

fn validate_password(password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
        );
    }
}

fn validate_name(name: &str, errors: &mut FieldErrors) {
    if name.chars().count() > MAX_NAME_LEN {
        errors.add("name", format!("Ensure this field has no more than {MAX_NAME_LEN} characters."));
    }
}

/// A write that lost a race on the unique email index reports the same field
/// error as the up-front check.
fn map_email_conflict(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Validation(FieldErrors::single("email", EMAIL_TAKEN))
        }
        _ => err.into(),
    }
}

async fn ensure_email_free(
    db: &DatabaseConnection,
    email: &str,
    current_user: Option<i32>,
    errors: &mut FieldErrors,
) -> Result<(), AppError> {
    if let Some(existing) = services::get_user_by_email(db, email).await? {
        if Some(existing.id) != current_user {
            errors.add("email", EMAIL_TAKEN);
        }
    }
    Ok(())
}

async fn insert_user(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    name: &str,
    superuser: bool,
    cost: u32,
) -> Result<user::Model, AppError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AppError::Validation(FieldErrors::single(
            "email",
            "Users must have an email address.",
        )));
    }
    let password_hash = hash_password(password.to_string(), cost).await?;
    let user = services::create_user(
        db,
        NewUser {
            email,
            name: name.to_string(),
            password_hash,
            is_staff: superuser,
            is_superuser: superuser,
        },
    )
    .await
    .map_err(map_email_conflict)?;
    Ok(user)
}

/// Store-level user creation: normalizes the email and hashes the password.
pub async fn create_user(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    cost: u32,
) -> Result<user::Model, AppError> {
    insert_user(db, email, password, "", false, cost).await
}

/// Like [`create_user`] but with staff and superuser flags set.
pub async fn create_superuser(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    cost: u32,
) -> Result<user::Model, AppError> {
    let mut errors = FieldErrors::new();
    ensure_email_free(db, &normalize_email(email), None, &mut errors).await?;
    errors.into_result()?;

    let user = insert_user(db, email, password, "", true, cost).await?;
    info!(user_id = user.id, "Superuser created.");
    Ok(user)
}

pub async fn register_user(
    db: &DatabaseConnection,
    req: RegisterRequest,
    cost: u32,
) -> Result<UserResponse, AppError> {
    let mut errors = FieldErrors::new();

    let email = req.email.as_deref().map(normalize_email).unwrap_or_default();
    match req.email {
        Some(_) => validate_email(&email, &mut errors),
        None => errors.add("email", "This field is required."),
    }
    match req.password.as_deref() {
        Some(password) => validate_password(password, &mut errors),
        None => errors.add("password", "This field is required."),
    }
    let name = req.name.unwrap_or_default().trim().to_string();
    validate_name(&name, &mut errors);

    if errors.get("email").is_none() {
        ensure_email_free(db, &email, None, &mut errors).await?;
    }
    errors.into_result()?;

    let password = req.password.unwrap_or_default();
    let user = insert_user(db, &email, &password, &name, false, cost).await?;
    info!(user_id = user.id, "User registered.");
    Ok(user.into())
}

/// Exchanges credentials for a token. Unknown emails, wrong passwords and
/// inactive accounts all yield the same error.
pub async fn login_user(
    db: &DatabaseConnection,
    req: LoginRequest,
    jwt_secret: &str,
    ttl_hours: i64,
) -> Result<TokenResponse, AppError> {
    let mut errors = FieldErrors::new();
    let email = req.email.as_deref().map(normalize_email).unwrap_or_default();
    if email.is_empty() {
        errors.add("email", "This field may not be blank.");
    }
    let password = req.password.unwrap_or_default();
    if password.is_empty() {
        errors.add("password", "This field may not be blank.");
    }
    errors.into_result()?;

    let user = services::get_user_by_email(db, &email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(password, user.password_hash.clone()).await? {
        warn!(user_id = user.id, "Login attempt with a wrong password.");
        return Err(AppError::InvalidCredentials);
    }
    if !user.active {
        warn!(user_id = user.id, "Login attempt for an inactive user.");
        return Err(AppError::InvalidCredentials);
    }

    create_jwt_for_user(&user, jwt_secret, ttl_hours)
}

pub fn create_jwt_for_user(
    user: &user::Model,
    jwt_secret: &str,
    ttl_hours: i64,
) -> Result<TokenResponse, AppError> {
    let expiration = (Utc::now() + Duration::hours(ttl_hours)).timestamp() as usize;

    let claims = Claims {
        sub: user.email.clone(),
        user_id: user.id,
        exp: expiration,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
        .map_err(|e| AppError::TokenCreationError(e.to_string()))?;

    Ok(TokenResponse { token })
}

/// Decodes and validates (signature, expiry) a token.
pub fn decode_token(token: &str, jwt_secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        warn!(error = ?e, "JWT decoding failed.");
        AppError::Unauthorized("Invalid token.".to_string())
    })
}

pub async fn get_profile(db: &DatabaseConnection, user_id: i32) -> Result<UserResponse, AppError> {
    services::get_user_by_id(db, user_id)
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))
}

/// Updates the caller's profile. With `partial` unset, `email` and `name` are
/// required; `password` is always optional and re-hashed when present.
pub async fn update_profile(
    db: &DatabaseConnection,
    user_id: i32,
    req: UpdateProfileRequest,
    partial: bool,
    cost: u32,
) -> Result<UserResponse, AppError> {
    let existing = services::get_user_by_id(db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    let mut errors = FieldErrors::new();
    let email = req.email.as_deref().map(normalize_email);
    match &email {
        Some(email) => {
            validate_email(email, &mut errors);
            if errors.get("email").is_none() {
                ensure_email_free(db, email, Some(user_id), &mut errors).await?;
            }
        }
        None if !partial => errors.add("email", "This field is required."),
        None => {}
    }
    let name = req.name.map(|n| n.trim().to_string());
    match &name {
        Some(name) => validate_name(name, &mut errors),
        None if !partial => errors.add("name", "This field is required."),
        None => {}
    }
    if let Some(password) = req.password.as_deref() {
        validate_password(password, &mut errors);
    }
    errors.into_result()?;

    let password_hash = match req.password {
        Some(password) => Some(hash_password(password, cost).await?),
        None => None,
    };
    let updated = services::update_user(
        db,
        existing,
        UserChanges {
            email,
            name,
            password_hash,
        },
    )
    .await
    .map_err(map_email_conflict)?;
    info!(user_id, "Profile updated.");
    Ok(updated.into())
}
