use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Mission {
    pub id: Uuid,
    /// The owning teacher.
    pub user_id: Uuid,
    pub content: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMissionRequest {
    #[validate(length(min = 1, max = 200, message = "Mission content must be 1-200 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMissionRequest {
    #[validate(length(min = 1, max = 200, message = "Mission content must be 1-200 characters"))]
    pub content: Option<String>,
}

/// Full desired ordering; every mission of the teacher must appear exactly
/// once.
#[derive(Debug, Deserialize)]
pub struct ReorderMissionsRequest {
    pub mission_ids: Vec<Uuid>,
}
