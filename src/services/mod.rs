pub mod aggregator;
pub mod date_window;
pub mod notify;
pub mod streak;
