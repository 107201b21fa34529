pub mod auth;
pub mod badges;
pub mod health;
pub mod mission_logs;
pub mod missions;
pub mod notifications;
pub mod students;
pub mod weekly;
pub mod ws;
