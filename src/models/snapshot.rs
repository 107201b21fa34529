use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The mission set active at a student's first visit of the day, frozen so
/// later mission edits do not rewrite history. `completed_mission_ids` is
/// kept in sync with `mission_logs` on every toggle and stays a subset of the
/// frozen mission ids.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailySnapshot {
    pub id: Uuid,
    pub student_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub missions: serde_json::Value,
    pub completed_mission_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shape of one entry in the `missions` JSONB array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMission {
    pub id: Uuid,
    pub content: String,
    pub sort_order: i32,
}

impl DailySnapshot {
    pub fn mission_entries(&self) -> Vec<SnapshotMission> {
        serde_json::from_value(self.missions.clone()).unwrap_or_default()
    }

    pub fn total_missions(&self) -> i32 {
        self.missions.as_array().map(|a| a.len()).unwrap_or(0) as i32
    }

    pub fn completed_missions(&self) -> i32 {
        self.completed_mission_ids.len() as i32
    }
}
