use axum::{extract::State, Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::handlers::missions::class_owner_id;
use crate::models::badge::{BadgeType, EarnedBadge, RewardGoal, UpsertRewardGoalRequest};
use crate::services::aggregator::{aggregate, DayCounts, WeekdayStatus};
use crate::services::date_window::{self, WeekWindow};
use crate::services::notify::QueueView;
use crate::services::streak::{self, RewardState, StreakDecision, WEEKLY_STREAK_BADGE_ID};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WeeklyStatusResponse {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub days: Vec<WeekdayStatus>,
}

#[derive(Debug, Serialize)]
pub struct WeeklyEvaluation {
    pub decision: StreakDecision,
    pub days: Vec<WeekdayStatus>,
    pub queue: QueueView,
}

#[derive(Debug, Deserialize)]
pub struct SelectBadgeRequest {
    pub badge_id: String,
}

#[derive(Debug, Serialize)]
pub struct SelectBadgeResponse {
    pub earned: EarnedBadge,
}

/// Snapshot counts and log fallbacks for one student's current week.
pub async fn load_week_statuses(
    state: &AppState,
    student_id: Uuid,
) -> AppResult<(WeekWindow, [WeekdayStatus; 5], NaiveDate)> {
    let zone = state.config.tz();
    let now = Utc::now();
    let window = date_window::week_bounds(now, zone);
    let today = date_window::local_today(now, zone);
    let weekdays = window.weekdays();

    let snapshot_rows = sqlx::query_as::<_, (NaiveDate, i32, i32)>(
        r#"
        SELECT snapshot_date, jsonb_array_length(missions), cardinality(completed_mission_ids)
        FROM daily_snapshots
        WHERE student_id = $1 AND snapshot_date BETWEEN $2 AND $3
        "#,
    )
    .bind(student_id)
    .bind(window.monday)
    .bind(window.friday())
    .fetch_all(&state.db)
    .await?;

    let snapshots: Vec<DayCounts> = snapshot_rows
        .into_iter()
        .map(|(date, total, completed)| DayCounts {
            date,
            total,
            completed,
        })
        .collect();

    let log_dates = sqlx::query_scalar::<_, NaiveDate>(
        r#"
        SELECT DISTINCT log_date FROM mission_logs
        WHERE student_id = $1 AND log_date BETWEEN $2 AND $3
        "#,
    )
    .bind(student_id)
    .bind(window.monday)
    .bind(window.friday())
    .fetch_all(&state.db)
    .await?;

    let statuses = aggregate(weekdays, &snapshots, &log_dates, today);
    Ok((window, statuses, today))
}

async fn has_weekly_award(state: &AppState, user_id: Uuid, window: &WeekWindow) -> AppResult<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM earned_badges
        WHERE user_id = $1 AND badge_type = $2 AND earned_at BETWEEN $3 AND $4
        "#,
    )
    .bind(user_id)
    .bind(BadgeType::Weekly)
    .bind(window.monday_start)
    .bind(window.sunday_end)
    .fetch_one(&state.db)
    .await?;
    Ok(count > 0)
}

pub async fn weekly_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<WeeklyStatusResponse>> {
    auth_user.require_student()?;
    let (window, statuses, _) = load_week_statuses(&state, auth_user.id).await?;

    Ok(Json(WeeklyStatusResponse {
        week_start: window.monday,
        week_end: window.sunday,
        days: statuses.to_vec(),
    }))
}

/// The refresh-on-resume entry point: the display layer calls this whenever
/// it regains focus or finishes a data refresh. Only a Friday with all five
/// days complete and no weekly award on record enqueues the streak sentinel.
pub async fn evaluate_week(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<WeeklyEvaluation>> {
    auth_user.require_student()?;
    let user_id = auth_user.id;

    let (window, statuses, today) = load_week_statuses(&state, user_id).await?;
    state.notify.begin_week(user_id, window.monday).await;
    state.notify.transition(user_id, RewardState::Evaluating).await;

    if !streak::streak_achieved(&statuses, today) {
        let decision = streak::decide(&statuses, today, false);
        state.notify.transition(user_id, RewardState::Idle).await;
        return Ok(Json(WeeklyEvaluation {
            decision,
            days: statuses.to_vec(),
            queue: state.notify.view(user_id).await,
        }));
    }

    // Already handled this session; do not re-query or re-enqueue.
    if state.notify.is_rewarded(user_id).await {
        return Ok(Json(WeeklyEvaluation {
            decision: StreakDecision::AlreadyRewarded,
            days: statuses.to_vec(),
            queue: state.notify.view(user_id).await,
        }));
    }

    // A query failure propagates here with the session left unmarked, so the
    // next refresh retries the whole evaluation.
    let decision = streak::decide(&statuses, today, has_weekly_award(&state, user_id, &window).await?);

    match decision {
        StreakDecision::AlreadyRewarded => {
            state.notify.mark_rewarded(user_id).await;
            state.notify.transition(user_id, RewardState::Done).await;
        }
        StreakDecision::Enqueue => {
            state.notify.enqueue(user_id, WEEKLY_STREAK_BADGE_ID).await;
            state.notify.mark_rewarded(user_id).await;
            tracing::info!(user_id = %user_id, "weekly streak achieved, sentinel queued");
        }
        StreakDecision::NotLastWeekday | StreakDecision::Incomplete => {}
    }

    Ok(Json(WeeklyEvaluation {
        decision,
        days: statuses.to_vec(),
        queue: state.notify.view(user_id).await,
    }))
}

/// Persist the student's weekly badge choice. The partial unique index on
/// (user, week) is the hard duplicate guard; the pre-checks only produce
/// friendlier errors for the common cases.
pub async fn select_weekly_badge(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<SelectBadgeRequest>,
) -> AppResult<Json<SelectBadgeResponse>> {
    auth_user.require_student()?;
    let user_id = auth_user.id;
    if body.badge_id.is_empty() {
        return Err(AppError::Validation("badge_id is required".into()));
    }

    let zone = state.config.tz();
    let now = Utc::now();
    let window = date_window::week_bounds(now, zone);
    let today = date_window::local_today(now, zone);
    state.notify.begin_week(user_id, window.monday).await;

    // Fail closed: one weekly award per week, no matter how the flow was
    // reached.
    if has_weekly_award(&state, user_id, &window).await? {
        state.notify.mark_rewarded(user_id).await;
        state.notify.transition(user_id, RewardState::Done).await;
        return Err(AppError::Conflict(
            "Weekly badge already awarded this week".into(),
        ));
    }

    // Double-submit guard for the chosen badge.
    let same_day = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM earned_badges WHERE user_id = $1 AND badge_id = $2 AND earned_on = $3",
    )
    .bind(user_id)
    .bind(&body.badge_id)
    .bind(today)
    .fetch_one(&state.db)
    .await?;
    if same_day > 0 {
        return Err(AppError::Conflict("Badge already earned today".into()));
    }

    let owner = class_owner_id(&state, &auth_user).await?;

    // The choice must come from the configured pool (or be the system badge
    // when no pool is set); anything else is rejected before it can reach the
    // catalog.
    let pool_ids = sqlx::query_scalar::<_, String>(
        "SELECT badge_id FROM weekly_badge_settings WHERE teacher_id = $1",
    )
    .bind(owner)
    .fetch_all(&state.db)
    .await?;
    if !streak::selection_allowed(&pool_ids, &body.badge_id) {
        return Err(AppError::Validation(
            "Badge is not offered in this week's pool".into(),
        ));
    }

    let reward_text = sqlx::query_scalar::<_, String>(
        "SELECT goal_text FROM weekly_reward_goals WHERE teacher_id = $1 AND week_start = $2",
    )
    .bind(owner)
    .bind(window.monday)
    .fetch_optional(&state.db)
    .await?;

    state.notify.transition(user_id, RewardState::Persisting).await;

    // Catalog insert and earned insert succeed or fail as one unit.
    let earned = persist_selection(
        &state,
        user_id,
        owner,
        &body.badge_id,
        today,
        window.monday,
        reward_text,
    )
    .await;

    let earned = match earned {
        Ok(e) => e,
        Err(e) => {
            let mapped = selection_error(e);
            if matches!(mapped, AppError::Conflict(_)) {
                state.notify.mark_rewarded(user_id).await;
                state.notify.transition(user_id, RewardState::Done).await;
            } else {
                state.notify.transition(user_id, RewardState::Error).await;
            }
            return Err(mapped);
        }
    };

    state.notify.mark_rewarded(user_id).await;
    state.notify.transition(user_id, RewardState::Done).await;

    if let Some(tx) = state.ws_tx.as_ref() {
        let msg = serde_json::json!({
            "type": "badge_earned",
            "user_id": user_id,
            "badge_id": earned.badge_id,
            "badge_type": "weekly",
        });
        let _ = tx.send(msg.to_string());
    }

    Ok(Json(SelectBadgeResponse { earned }))
}

/// Failures inside the selection transaction. A unique violation means some
/// concurrent flow already awarded this week and maps to Conflict; everything
/// else surfaces unchanged.
fn selection_error(e: AppError) -> AppError {
    match e {
        AppError::Database(db) if is_unique_violation(&db) => {
            AppError::Conflict("Weekly badge already awarded this week".into())
        }
        other => other,
    }
}

async fn persist_selection(
    state: &AppState,
    user_id: Uuid,
    owner: Uuid,
    badge_id: &str,
    today: NaiveDate,
    week_start: NaiveDate,
    reward_text: Option<String>,
) -> AppResult<EarnedBadge> {
    let mut tx = state.db.begin().await?;

    // Custom image badges may not be in the catalog yet; they share the
    // sentinel's display name and description.
    let (sentinel_name, sentinel_desc) = sqlx::query_as::<_, (String, String)>(
        "SELECT name, description FROM badges WHERE id = $1",
    )
    .bind(WEEKLY_STREAK_BADGE_ID)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO badges (id, user_id, name, description, badge_type, is_custom, condition_type)
        VALUES ($1, $2, $3, $4, 'weekly', true, 'weekly_streak')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(badge_id)
    .bind(owner)
    .bind(&sentinel_name)
    .bind(&sentinel_desc)
    .execute(&mut *tx)
    .await?;

    let earned = sqlx::query_as::<_, EarnedBadge>(
        r#"
        INSERT INTO earned_badges (id, user_id, badge_id, badge_type, earned_on, week_start, reward_text)
        VALUES ($1, $2, $3, 'weekly', $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(badge_id)
    .bind(today)
    .bind(week_start)
    .bind(&reward_text)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(earned)
}

pub async fn get_reward_goal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Option<RewardGoal>>> {
    let owner = class_owner_id(&state, &auth_user).await?;
    let window = date_window::week_bounds(Utc::now(), state.config.tz());

    let goal = sqlx::query_as::<_, RewardGoal>(
        "SELECT * FROM weekly_reward_goals WHERE teacher_id = $1 AND week_start = $2",
    )
    .bind(owner)
    .bind(window.monday)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(goal))
}

pub async fn upsert_reward_goal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpsertRewardGoalRequest>,
) -> AppResult<Json<RewardGoal>> {
    auth_user.require_teacher()?;
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let window = date_window::week_bounds(Utc::now(), state.config.tz());

    let goal = sqlx::query_as::<_, RewardGoal>(
        r#"
        INSERT INTO weekly_reward_goals (id, teacher_id, week_start, goal_text)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (teacher_id, week_start) DO UPDATE SET
            goal_text = $4,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(window.monday)
    .bind(&body.goal_text)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(goal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::fake_db;

    #[test]
    fn duplicate_week_award_maps_to_conflict() {
        // The partial unique index on (user, week) fires inside the selection
        // transaction; the caller must see Conflict, not a 500.
        match selection_error(AppError::Database(fake_db::error("23505"))) {
            AppError::Conflict(msg) => assert!(msg.contains("already awarded")),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn other_selection_failures_pass_through() {
        assert!(matches!(
            selection_error(AppError::Database(fake_db::error("53300"))),
            AppError::Database(_)
        ));
        assert!(matches!(
            selection_error(AppError::Validation("bad".into())),
            AppError::Validation(_)
        ));
    }
}
