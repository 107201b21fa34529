use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{conflict_on_unique, AppError, AppResult};
use crate::models::mission::{
    CreateMissionRequest, Mission, ReorderMissionsRequest, UpdateMissionRequest,
};
use crate::models::user::User;
use crate::AppState;

/// Resolve whose mission board applies: teachers see their own, students
/// their teacher's.
pub async fn class_owner_id(state: &AppState, auth_user: &AuthUser) -> AppResult<Uuid> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;
    Ok(user.class_owner_id())
}

pub async fn list_missions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<Mission>>> {
    let owner = class_owner_id(&state, &auth_user).await?;

    let missions = sqlx::query_as::<_, Mission>(
        "SELECT * FROM missions WHERE user_id = $1 ORDER BY sort_order ASC",
    )
    .bind(owner)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(missions))
}

pub async fn create_mission(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateMissionRequest>,
) -> AppResult<Json<Mission>> {
    auth_user.require_teacher()?;
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    // The next sort_order is computed inside the insert itself; racing
    // creates collide on UNIQUE (user_id, sort_order) and surface as a
    // retryable Conflict rather than a torn read-then-write.
    let mission = sqlx::query_as::<_, Mission>(
        r#"
        INSERT INTO missions (id, user_id, content, sort_order)
        VALUES ($1, $2, $3,
                (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM missions WHERE user_id = $2))
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&body.content)
    .fetch_one(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "Mission order changed concurrently, please retry"))?;

    Ok(Json(mission))
}

pub async fn update_mission(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(mission_id): Path<Uuid>,
    Json(body): Json<UpdateMissionRequest>,
) -> AppResult<Json<Mission>> {
    auth_user.require_teacher()?;
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let mission = sqlx::query_as::<_, Mission>(
        r#"
        UPDATE missions SET
            content = COALESCE($3, content),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(mission_id)
    .bind(auth_user.id)
    .bind(&body.content)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Mission not found".into()))?;

    Ok(Json(mission))
}

pub async fn delete_mission(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(mission_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    auth_user.require_teacher()?;

    let result = sqlx::query("DELETE FROM missions WHERE id = $1 AND user_id = $2")
        .bind(mission_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Mission not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Replace the board's ordering with the given sequence. Ordering stays
/// dense: position in the list becomes `sort_order`.
pub async fn reorder_missions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<ReorderMissionsRequest>,
) -> AppResult<Json<Vec<Mission>>> {
    auth_user.require_teacher()?;

    let existing = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM missions WHERE user_id = $1",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    if existing.len() != body.mission_ids.len()
        || !existing.iter().all(|id| body.mission_ids.contains(id))
    {
        return Err(AppError::Validation(
            "Reorder must list every mission exactly once".into(),
        ));
    }

    let mut tx = state.db.begin().await?;
    for (position, mission_id) in body.mission_ids.iter().enumerate() {
        sqlx::query(
            "UPDATE missions SET sort_order = $3, updated_at = NOW() WHERE id = $1 AND user_id = $2",
        )
        .bind(mission_id)
        .bind(auth_user.id)
        .bind(position as i32 + 1)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let missions = sqlx::query_as::<_, Mission>(
        "SELECT * FROM missions WHERE user_id = $1 ORDER BY sort_order ASC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(missions))
}
