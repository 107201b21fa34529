use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::AppState;

/// Login endpoints: a classroom of students scanning QR codes at the same
/// time still fits comfortably under this.
const MAX_REQUESTS: u32 = 10;
const WINDOW_SECS: u64 = 60;

/// In-memory fixed-window limiter (single-instance deployments).
#[derive(Clone, Default)]
pub struct RateLimitState {
    entries: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns remaining capacity, or the retry-after duration when limited.
    pub async fn check(&self, key: &str) -> Result<u32, Duration> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(WINDOW_SECS);

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) > window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= MAX_REQUESTS {
            return Err(window.saturating_sub(now.duration_since(entry.window_start)));
        }

        entry.count += 1;
        Ok(MAX_REQUESTS - entry.count)
    }
}

/// Rate limiting middleware for the login/QR endpoints, keyed by IP + path.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = addr.ip().to_string();
    let path = req.uri().path().to_string();
    let key = format!("{}:{}", ip, path);

    match state.rate_limiter.check(&key).await {
        Ok(_) => Ok(next.run(req).await),
        Err(retry_after) => {
            tracing::warn!(
                ip = %ip,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "Login rate limit exceeded"
            );
            Err(AppError::RateLimited)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit() {
        let limiter = RateLimitState::new();
        for i in 0..MAX_REQUESTS {
            assert!(limiter.check("k").await.is_ok(), "request {} blocked", i + 1);
        }
        assert!(limiter.check("k").await.is_err());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimitState::new();
        for _ in 0..MAX_REQUESTS {
            let _ = limiter.check("a").await;
        }
        assert!(limiter.check("b").await.is_ok());
    }
}
