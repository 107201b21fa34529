use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MissionLog {
    pub id: Uuid,
    pub student_id: Uuid,
    pub mission_id: Uuid,
    pub log_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleLogRequest {
    pub mission_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// One mission in the today view, joined with its completion flag from the
/// day's snapshot.
#[derive(Debug, Serialize)]
pub struct TodayMission {
    pub id: Uuid,
    pub content: String,
    pub sort_order: i32,
    pub is_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct TodayView {
    pub date: NaiveDate,
    pub missions: Vec<TodayMission>,
    pub total_missions: i32,
    pub completed_missions: i32,
}
