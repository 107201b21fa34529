use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::missions::class_owner_id;
use crate::models::badge::{
    Badge, BadgeConditionType, BadgeType, CreateBadgeRequest, EarnedBadge, WeeklyPoolRequest,
};
use crate::services::streak::WEEKLY_POOL_MAX;
use crate::AppState;

/// Earned row joined with its catalog metadata for display.
#[derive(Debug, Serialize, FromRow)]
pub struct EarnedBadgeCard {
    pub id: Uuid,
    pub badge_id: String,
    pub badge_type: BadgeType,
    pub name: String,
    pub description: String,
    pub image_path: Option<String>,
    pub earned_on: NaiveDate,
    pub reward_text: Option<String>,
    pub reward_used: bool,
    pub earned_at: DateTime<Utc>,
}

/// The class catalog: the teacher's badges plus system-seeded ones.
pub async fn list_badges(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Badge>>> {
    let owner = class_owner_id(&state, &auth_user).await?;

    let badges = sqlx::query_as::<_, Badge>(
        r#"
        SELECT * FROM badges
        WHERE (user_id = $1 OR user_id IS NULL) AND is_active
        ORDER BY created_at ASC
        "#,
    )
    .bind(owner)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(badges))
}

pub async fn create_badge(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateBadgeRequest>,
) -> AppResult<Json<Badge>> {
    auth_user.require_teacher()?;
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let condition_type = body.condition_type.unwrap_or(BadgeConditionType::Manual);
    if condition_type == BadgeConditionType::CompletionCount && body.condition_value.is_none() {
        return Err(AppError::Validation(
            "completion_count badges need a condition_value".into(),
        ));
    }

    let badge = sqlx::query_as::<_, Badge>(
        r#"
        INSERT INTO badges (id, user_id, name, description, image_path, badge_type, is_custom, condition_type, condition_value)
        VALUES ($1, $2, $3, $4, $5, 'mission', $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(auth_user.id)
    .bind(&body.name)
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(&body.image_path)
    .bind(body.image_path.is_some())
    .bind(condition_type)
    .bind(body.condition_value)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(badge))
}

pub async fn delete_badge(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(badge_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    auth_user.require_teacher()?;

    // Soft delete: earned rows keep pointing at the metadata.
    let result = sqlx::query(
        "UPDATE badges SET is_active = false WHERE id = $1 AND user_id = $2",
    )
    .bind(&badge_id)
    .bind(auth_user.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Badge not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn list_earned(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<EarnedBadgeCard>>> {
    let cards = sqlx::query_as::<_, EarnedBadgeCard>(
        r#"
        SELECT e.id, e.badge_id, e.badge_type, b.name, b.description, b.image_path,
               e.earned_on, e.reward_text, e.reward_used, e.earned_at
        FROM earned_badges e
        JOIN badges b ON b.id = e.badge_id
        WHERE e.user_id = $1
        ORDER BY e.earned_at DESC
        "#,
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(cards))
}

/// Mark the reward tied to an earned badge as redeemed. Students redeem their
/// own; teachers may redeem on behalf of any student in their class.
pub async fn use_reward(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(earned_id): Path<Uuid>,
) -> AppResult<Json<EarnedBadge>> {
    let earned = sqlx::query_as::<_, EarnedBadge>(
        r#"
        UPDATE earned_badges e
        SET reward_used = true
        FROM users u
        WHERE e.id = $1
          AND e.user_id = u.id
          AND (e.user_id = $2 OR u.teacher_id = $2)
        RETURNING e.*
        "#,
    )
    .bind(earned_id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Earned badge not found".into()))?;

    Ok(Json(earned))
}

/// The badge choices offered at weekly-streak time, in pool order.
pub async fn get_weekly_pool(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Badge>>> {
    let owner = class_owner_id(&state, &auth_user).await?;

    let pool = sqlx::query_as::<_, Badge>(
        r#"
        SELECT b.* FROM weekly_badge_settings s
        JOIN badges b ON b.id = s.badge_id
        WHERE s.teacher_id = $1
        ORDER BY s.position ASC
        "#,
    )
    .bind(owner)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(pool))
}

/// Replace the weekly pool wholesale; order in the request is pool order.
pub async fn put_weekly_pool(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<WeeklyPoolRequest>,
) -> AppResult<Json<Vec<Badge>>> {
    auth_user.require_teacher()?;

    if body.badge_ids.len() > WEEKLY_POOL_MAX {
        return Err(AppError::Validation(format!(
            "Weekly pool holds at most {} badges",
            WEEKLY_POOL_MAX
        )));
    }

    let distinct: std::collections::HashSet<&String> = body.badge_ids.iter().collect();
    if distinct.len() != body.badge_ids.len() {
        return Err(AppError::Validation("Duplicate badge in pool".into()));
    }

    for badge_id in &body.badge_ids {
        let visible = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM badges WHERE id = $1 AND (user_id = $2 OR user_id IS NULL)",
        )
        .bind(badge_id)
        .bind(auth_user.id)
        .fetch_one(&state.db)
        .await?;
        if visible == 0 {
            return Err(AppError::NotFound(format!("Badge {} not found", badge_id)));
        }
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM weekly_badge_settings WHERE teacher_id = $1")
        .bind(auth_user.id)
        .execute(&mut *tx)
        .await?;
    for (position, badge_id) in body.badge_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO weekly_badge_settings (teacher_id, badge_id, position) VALUES ($1, $2, $3)",
        )
        .bind(auth_user.id)
        .bind(badge_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let pool = sqlx::query_as::<_, Badge>(
        r#"
        SELECT b.* FROM weekly_badge_settings s
        JOIN badges b ON b.id = s.badge_id
        WHERE s.teacher_id = $1
        ORDER BY s.position ASC
        "#,
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(pool))
}
