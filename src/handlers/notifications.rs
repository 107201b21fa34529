use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::handlers::missions::class_owner_id;
use crate::models::badge::{Badge, BadgeType};
use crate::services::notify::{ClaimOutcome, QueueView};
use crate::services::streak::{self, RewardState, WEEKLY_STREAK_BADGE_ID};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessedNotification {
    /// The weekly-streak sentinel reached the front: the student now picks
    /// one badge from the teacher's pool. Nothing is persisted yet.
    WeeklySelection {
        choices: Vec<Badge>,
        reward_goal: Option<String>,
    },
    /// An ordinary badge was awarded (or found already awarded) and its card
    /// is ready for display.
    BadgeEarned { badge: Badge },
    /// The entry was consumed without any user-visible outcome.
    Dropped,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub processed: Option<ProcessedNotification>,
    pub queue: QueueView,
}

pub async fn queue_state(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<QueueView>> {
    Ok(Json(state.notify.view(auth_user.id).await))
}

/// Process the front queue entry, if any. At most one cycle runs per user;
/// calls that race an in-flight cycle return without starting a second one.
/// The entry leaves the queue whether processing succeeded or not.
pub async fn process_next(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ProcessResponse>> {
    auth_user.require_student()?;
    let user_id = auth_user.id;

    // A queue carried over from an earlier week is discarded before anything
    // in it can be processed.
    let window = crate::services::date_window::week_bounds(Utc::now(), state.config.tz());
    state.notify.begin_week(user_id, window.monday).await;

    let (outcome, entry) = state.notify.claim(user_id).await;
    let badge_id = match (outcome, entry) {
        (ClaimOutcome::Claimed, Some(id)) => id,
        _ => {
            return Ok(Json(ProcessResponse {
                processed: None,
                queue: state.notify.view(user_id).await,
            }));
        }
    };

    let result = process_entry(&state, &auth_user, &badge_id).await;
    state.notify.finish(user_id).await;

    let processed = match result {
        Ok(p) => Some(p),
        Err(e) => {
            // Dropped, not retried; the failure only costs a notification.
            tracing::error!(user_id = %user_id, badge_id = %badge_id, error = %e, "notification processing failed");
            Some(ProcessedNotification::Dropped)
        }
    };

    Ok(Json(ProcessResponse {
        processed,
        queue: state.notify.view(user_id).await,
    }))
}

async fn process_entry(
    state: &AppState,
    auth_user: &AuthUser,
    badge_id: &str,
) -> AppResult<ProcessedNotification> {
    if badge_id == WEEKLY_STREAK_BADGE_ID {
        process_sentinel(state, auth_user).await
    } else {
        process_ordinary(state, auth_user.id, badge_id).await
    }
}

/// Branch A: the sentinel routes to badge selection. A weekly award that
/// appeared since evaluation (another device, another tab) drops the entry
/// silently.
async fn process_sentinel(
    state: &AppState,
    auth_user: &AuthUser,
) -> AppResult<ProcessedNotification> {
    let user_id = auth_user.id;
    let window = crate::services::date_window::week_bounds(Utc::now(), state.config.tz());

    let existing = sqlx::query_scalar::<_, i64>(
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

    if existing > 0 {
        tracing::debug!(user_id = %user_id, "weekly badge already earned, dropping sentinel");
        state.notify.mark_rewarded(user_id).await;
        state.notify.transition(user_id, RewardState::Done).await;
        return Ok(ProcessedNotification::Dropped);
    }

    let owner = class_owner_id(state, auth_user).await?;

    let mut choices = sqlx::query_as::<_, Badge>(
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

    // An unconfigured pool still offers the system badge.
    if choices.is_empty() {
        let sentinel = sqlx::query_as::<_, Badge>("SELECT * FROM badges WHERE id = $1")
            .bind(WEEKLY_STREAK_BADGE_ID)
            .fetch_one(&state.db)
            .await?;
        choices.push(sentinel);
    }

    let reward_goal = sqlx::query_scalar::<_, String>(
        "SELECT goal_text FROM weekly_reward_goals WHERE teacher_id = $1 AND week_start = $2",
    )
    .bind(owner)
    .bind(window.monday)
    .fetch_optional(&state.db)
    .await?;

    state
        .notify
        .transition(user_id, RewardState::AwaitingSelection)
        .await;

    Ok(ProcessedNotification::WeeklySelection {
        choices,
        reward_goal,
    })
}

/// Branch B: ordinary ids persist an earned record, then surface the badge
/// card. The unique constraint absorbs repeat awards for the same day.
async fn process_ordinary(
    state: &AppState,
    user_id: Uuid,
    badge_id: &str,
) -> AppResult<ProcessedNotification> {
    let zone = state.config.tz();
    let now = Utc::now();
    let today = crate::services::date_window::local_today(now, zone);

    let (badge_type, week_start) = if streak::is_weekly_badge_id(badge_id) {
        let window = crate::services::date_window::week_bounds(now, zone);
        (BadgeType::Weekly, Some(window.monday))
    } else {
        (BadgeType::Mission, None)
    };

    sqlx::query(
        r#"
        INSERT INTO earned_badges (id, user_id, badge_id, badge_type, earned_on, week_start)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(badge_id)
    .bind(badge_type)
    .bind(today)
    .bind(week_start)
    .execute(&state.db)
    .await?;

    let badge = sqlx::query_as::<_, Badge>("SELECT * FROM badges WHERE id = $1")
        .bind(badge_id)
        .fetch_optional(&state.db)
        .await?;

    match badge {
        Some(badge) => {
            if let Some(tx) = state.ws_tx.as_ref() {
                let msg = serde_json::json!({
                    "type": "badge_earned",
                    "user_id": user_id,
                    "badge_id": badge.id,
                    "badge_type": badge_type,
                });
                let _ = tx.send(msg.to_string());
            }
            Ok(ProcessedNotification::BadgeEarned { badge })
        }
        None => {
            tracing::warn!(user_id = %user_id, badge_id, "earned badge has no catalog entry, dropping");
            Ok(ProcessedNotification::Dropped)
        }
    }
}
