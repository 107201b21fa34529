use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Badge {
    /// Text id: system badges use well-known ids ("weekly_streak_1"),
    /// teacher-created ones a generated uuid string.
    pub id: String,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub image_path: Option<String>,
    pub badge_type: BadgeType,
    pub is_custom: bool,
    pub condition_type: BadgeConditionType,
    pub condition_value: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "badge_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BadgeType {
    Mission,
    Weekly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "badge_condition_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BadgeConditionType {
    /// Awarded only through an explicit flow.
    Manual,
    /// Awarded once a student's lifetime completion count reaches
    /// `condition_value`.
    CompletionCount,
    /// The weekly-streak slot.
    WeeklyStreak,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EarnedBadge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub badge_id: String,
    pub badge_type: BadgeType,
    pub earned_on: NaiveDate,
    pub week_start: Option<NaiveDate>,
    pub reward_text: Option<String>,
    /// Set once the classroom reward tied to this badge has been redeemed.
    pub reward_used: bool,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBadgeRequest {
    #[validate(length(min = 1, max = 100, message = "Badge name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description must be under 500 characters"))]
    pub description: Option<String>,
    pub image_path: Option<String>,
    pub condition_type: Option<BadgeConditionType>,
    #[validate(range(min = 1, message = "Condition value must be positive"))]
    pub condition_value: Option<i32>,
}

/// Replaces the teacher's weekly pool; at most five ids, ordered.
#[derive(Debug, Deserialize)]
pub struct WeeklyPoolRequest {
    pub badge_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RewardGoal {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub week_start: NaiveDate,
    pub goal_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertRewardGoalRequest {
    #[validate(length(min = 1, max = 200, message = "Goal text must be 1-200 characters"))]
    pub goal_text: String,
}
