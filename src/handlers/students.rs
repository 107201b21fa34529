use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::hash_token;
use crate::auth::middleware::AuthUser;
use crate::auth::password::{generate_pin, hash_password};
use crate::error::{AppError, AppResult};
use crate::models::user::{User, UserProfile};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    pub name: String,
}

/// The raw QR token and PIN are returned exactly once, at creation or
/// regeneration; only their hashes are stored.
#[derive(Debug, Serialize)]
pub struct StudentCredentials {
    pub student: UserProfile,
    pub qr_token: String,
    pub pin: String,
}

pub async fn create_student(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateStudentRequest>,
) -> AppResult<Json<StudentCredentials>> {
    auth_user.require_teacher()?;
    if body.name.is_empty() {
        return Err(AppError::Validation("Student name is required".into()));
    }

    let raw_token = Uuid::new_v4().to_string();
    let pin = generate_pin();
    let student_id = Uuid::new_v4();

    let student = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, role, name, pin_hash, qr_token_hash, teacher_id)
        VALUES ($1, 'student', $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(&body.name)
    .bind(hash_password(&pin)?)
    .bind(hash_token(&raw_token))
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(StudentCredentials {
        student: student.into(),
        qr_token: raw_token,
        pin,
    }))
}

pub async fn list_students(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<UserProfile>>> {
    auth_user.require_teacher()?;

    let students = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE teacher_id = $1 ORDER BY name ASC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(students.into_iter().map(Into::into).collect()))
}

pub async fn delete_student(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(student_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    auth_user.require_teacher()?;

    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND teacher_id = $2")
        .bind(student_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Invalidate the old QR code and PIN (e.g. a lost card) and hand out new
/// credentials.
pub async fn regenerate_credentials(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(student_id): Path<Uuid>,
) -> AppResult<Json<StudentCredentials>> {
    auth_user.require_teacher()?;

    let raw_token = Uuid::new_v4().to_string();
    let pin = generate_pin();

    let student = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET pin_hash = $3, qr_token_hash = $4, updated_at = NOW()
        WHERE id = $1 AND teacher_id = $2
        RETURNING *
        "#,
    )
    .bind(student_id)
    .bind(auth_user.id)
    .bind(hash_password(&pin)?)
    .bind(hash_token(&raw_token))
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Student not found".into()))?;

    Ok(Json(StudentCredentials {
        student: student.into(),
        qr_token: raw_token,
        pin,
    }))
}
