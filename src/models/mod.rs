pub mod badge;
pub mod mission;
pub mod mission_log;
pub mod snapshot;
pub mod user;
