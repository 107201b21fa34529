use axum::{extract::State, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{
    jwt::{create_access_token, hash_token, AccessToken},
    middleware::AuthUser,
    password::{hash_password, verify_password},
};
use crate::error::{AppError, AppResult};
use crate::models::user::{User, UserProfile, UserRole};
use crate::AppState;

/// Cookie holding a student's raw QR token between sessions.
pub const QR_COOKIE: &str = "md_qr";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct QrLoginRequest {
    /// Raw QR token; falls back to the `md_qr` cookie when absent.
    pub qr_token: Option<String>,
    pub pin: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<AccessToken>> {
    if body.email.is_empty() || body.name.is_empty() || body.password.len() < 8 {
        return Err(AppError::Validation(
            "Email and name are required and password must be at least 8 characters".into(),
        ));
    }

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(&body.email)
        .fetch_one(&state.db)
        .await?;

    if existing > 0 {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let pwd_hash = hash_password(&body.password)?;
    let user_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO users (id, role, name, email, password_hash)
        VALUES ($1, 'teacher', $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(&body.name)
    .bind(&body.email)
    .bind(&pwd_hash)
    .execute(&state.db)
    .await?;

    let token = create_access_token(user_id, UserRole::Teacher, &state.config)?;
    Ok(Json(token))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AccessToken>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email = $1 AND role = 'teacher'",
    )
    .bind(&body.email)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    let password_hash = user.password_hash.as_deref().ok_or(AppError::Unauthorized)?;
    if !verify_password(&body.password, password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = create_access_token(user.id, user.role, &state.config)?;
    Ok(Json(token))
}

/// Student login: the scanned (or cookie-stored) QR token identifies the
/// roster row; the PIN confirms it.
pub async fn qr_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<QrLoginRequest>,
) -> AppResult<(CookieJar, Json<AccessToken>)> {
    if body.pin.len() != 4 || !body.pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("PIN must be exactly 4 digits".into()));
    }

    let raw_token = body
        .qr_token
        .clone()
        .or_else(|| jar.get(QR_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AppError::Unauthorized)?;

    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE qr_token_hash = $1 AND role = 'student'",
    )
    .bind(hash_token(&raw_token))
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    let pin_hash = user.pin_hash.as_deref().ok_or(AppError::Unauthorized)?;
    if !verify_password(&body.pin, pin_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = create_access_token(user.id, user.role, &state.config)?;

    let jar = jar.add(
        Cookie::build((QR_COOKIE, raw_token))
            .path("/")
            .http_only(true),
    );
    Ok((jar, Json(token)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    Ok(Json(user.into()))
}
