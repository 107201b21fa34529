use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::missions::class_owner_id;
use crate::models::mission::Mission;
use crate::models::mission_log::{LogQuery, MissionLog, TodayMission, TodayView, ToggleLogRequest};
use crate::models::snapshot::{DailySnapshot, SnapshotMission};
use crate::AppState;

/// Load the student's snapshot for `date`, creating it on the first visit of
/// the day by freezing the teacher's current mission set. The unique
/// constraint makes concurrent first visits converge on one row.
async fn ensure_snapshot(
    state: &AppState,
    student_id: Uuid,
    owner_id: Uuid,
    date: NaiveDate,
) -> AppResult<DailySnapshot> {
    let existing = sqlx::query_as::<_, DailySnapshot>(
        "SELECT * FROM daily_snapshots WHERE student_id = $1 AND snapshot_date = $2",
    )
    .bind(student_id)
    .bind(date)
    .fetch_optional(&state.db)
    .await?;

    if let Some(snapshot) = existing {
        return Ok(snapshot);
    }

    let missions = sqlx::query_as::<_, Mission>(
        "SELECT * FROM missions WHERE user_id = $1 ORDER BY sort_order ASC",
    )
    .bind(owner_id)
    .fetch_all(&state.db)
    .await?;

    let frozen: Vec<SnapshotMission> = missions
        .into_iter()
        .map(|m| SnapshotMission {
            id: m.id,
            content: m.content,
            sort_order: m.sort_order,
        })
        .collect();

    sqlx::query(
        r#"
        INSERT INTO daily_snapshots (id, student_id, snapshot_date, missions)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (student_id, snapshot_date) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(date)
    .bind(serde_json::to_value(&frozen).map_err(anyhow::Error::from)?)
    .execute(&state.db)
    .await?;

    let snapshot = sqlx::query_as::<_, DailySnapshot>(
        "SELECT * FROM daily_snapshots WHERE student_id = $1 AND snapshot_date = $2",
    )
    .bind(student_id)
    .bind(date)
    .fetch_one(&state.db)
    .await?;

    Ok(snapshot)
}

pub async fn today_view(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<TodayView>> {
    auth_user.require_student()?;
    let owner = class_owner_id(&state, &auth_user).await?;
    let today = crate::services::date_window::local_today(Utc::now(), state.config.tz());

    let snapshot = ensure_snapshot(&state, auth_user.id, owner, today).await?;

    let missions: Vec<TodayMission> = snapshot
        .mission_entries()
        .into_iter()
        .map(|m| TodayMission {
            is_completed: snapshot.completed_mission_ids.contains(&m.id),
            id: m.id,
            content: m.content,
            sort_order: m.sort_order,
        })
        .collect();

    Ok(Json(TodayView {
        date: today,
        total_missions: snapshot.total_missions(),
        completed_missions: snapshot.completed_missions(),
        missions,
    }))
}

/// Mark or unmark a mission for today. Creates/deletes the completion log and
/// keeps the day's snapshot in sync; a duplicate create is absorbed by the
/// (student, mission, day) unique constraint.
pub async fn toggle_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<ToggleLogRequest>,
) -> AppResult<Json<serde_json::Value>> {
    auth_user.require_student()?;
    let owner = class_owner_id(&state, &auth_user).await?;
    let zone = state.config.tz();
    let now = Utc::now();
    let today = crate::services::date_window::local_today(now, zone);

    let snapshot = ensure_snapshot(&state, auth_user.id, owner, today).await?;
    if !snapshot.mission_entries().iter().any(|m| m.id == body.mission_id) {
        return Err(AppError::NotFound("Mission is not on today's board".into()));
    }

    let existing = sqlx::query_as::<_, MissionLog>(
        "SELECT * FROM mission_logs WHERE student_id = $1 AND mission_id = $2 AND log_date = $3",
    )
    .bind(auth_user.id)
    .bind(body.mission_id)
    .bind(today)
    .fetch_optional(&state.db)
    .await?;

    // Log row and snapshot array move together or not at all; a torn pair
    // would break `completed_mission_ids ⊆ missions` derivations until the
    // next toggle.
    let result = if let Some(existing) = existing {
        let mut tx = state.db.begin().await?;
        sqlx::query("DELETE FROM mission_logs WHERE id = $1")
            .bind(existing.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE daily_snapshots
            SET completed_mission_ids = array_remove(completed_mission_ids, $2),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(snapshot.id)
        .bind(body.mission_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        serde_json::json!({ "action": "deleted", "log_id": existing.id })
    } else {
        let log_id = Uuid::new_v4();
        let mut tx = state.db.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO mission_logs (id, student_id, mission_id, log_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, mission_id, log_date) DO NOTHING
            "#,
        )
        .bind(log_id)
        .bind(auth_user.id)
        .bind(body.mission_id)
        .bind(today)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE daily_snapshots
            SET completed_mission_ids = array_append(completed_mission_ids, $2),
                updated_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(completed_mission_ids))
            "#,
        )
        .bind(snapshot.id)
        .bind(body.mission_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        check_completion_badges(&state, auth_user.id, owner).await;

        serde_json::json!({ "action": "created", "log_id": log_id })
    };

    if let Some(tx) = state.ws_tx.as_ref() {
        let msg = serde_json::json!({
            "type": "completion_changed",
            "user_id": auth_user.id,
            "mission_id": body.mission_id,
            "date": crate::services::date_window::format_iso_date(now, zone),
        });
        let _ = tx.send(msg.to_string());
    }

    Ok(Json(result))
}

pub async fn list_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<MissionLog>>> {
    let today = crate::services::date_window::local_today(Utc::now(), state.config.tz());
    let start = query
        .start_date
        .unwrap_or_else(|| today - chrono::Duration::days(30));
    let end = query.end_date.unwrap_or(today);

    let logs = sqlx::query_as::<_, MissionLog>(
        r#"
        SELECT * FROM mission_logs
        WHERE student_id = $1 AND log_date BETWEEN $2 AND $3
        ORDER BY log_date DESC, created_at DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(logs))
}

/// Queue any completion-count badges the student has newly reached. Failures
/// here only cost a notification, so they are logged and swallowed.
async fn check_completion_badges(state: &AppState, student_id: Uuid, owner_id: Uuid) {
    let outcome: AppResult<Vec<String>> = async {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM mission_logs WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_one(&state.db)
        .await?;

        let reached = sqlx::query_scalar::<_, String>(
            r#"
            SELECT b.id FROM badges b
            WHERE b.user_id = $1
              AND b.is_active
              AND b.condition_type = 'completion_count'
              AND b.condition_value <= $2
              AND NOT EXISTS (
                  SELECT 1 FROM earned_badges e
                  WHERE e.user_id = $3 AND e.badge_id = b.id
              )
            ORDER BY b.condition_value ASC
            "#,
        )
        .bind(owner_id)
        .bind(total)
        .bind(student_id)
        .fetch_all(&state.db)
        .await?;

        Ok(reached)
    }
    .await;

    match outcome {
        Ok(badge_ids) => {
            for badge_id in badge_ids {
                state.notify.enqueue(student_id, &badge_id).await;
            }
        }
        Err(e) => {
            tracing::error!(student_id = %student_id, error = %e, "completion badge check failed");
        }
    }
}
