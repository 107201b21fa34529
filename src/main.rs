use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;

use auth::rate_limit::RateLimitState;
use config::Config;
use services::notify::NotifyRegistry;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub ws_tx: Option<broadcast::Sender<String>>,
    pub rate_limiter: RateLimitState,
    pub notify: NotifyRegistry,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "missionday_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    let db = db::create_pool(&config.database_url).await;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let (ws_tx, _) = broadcast::channel::<String>(256);

    let state = AppState {
        db,
        config: config.clone(),
        ws_tx: Some(ws_tx),
        rate_limiter: RateLimitState::new(),
        notify: NotifyRegistry::new(),
    };

    // Login endpoints carry rate limiting; QR login doubly so since it is
    // reachable with nothing but a scanned token.
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/qr", post(handlers::auth::qr_login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_login,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(auth_routes);

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        // Students (teacher roster)
        .route("/api/students", get(handlers::students::list_students))
        .route("/api/students", post(handlers::students::create_student))
        .route("/api/students/:id", delete(handlers::students::delete_student))
        .route(
            "/api/students/:id/credentials",
            post(handlers::students::regenerate_credentials),
        )
        // Missions
        .route("/api/missions", get(handlers::missions::list_missions))
        .route("/api/missions", post(handlers::missions::create_mission))
        .route("/api/missions/order", put(handlers::missions::reorder_missions))
        .route("/api/missions/:id", put(handlers::missions::update_mission))
        .route("/api/missions/:id", delete(handlers::missions::delete_mission))
        // Completion logs & today view
        .route("/api/logs/today", get(handlers::mission_logs::today_view))
        .route("/api/logs/toggle", post(handlers::mission_logs::toggle_log))
        .route("/api/logs", get(handlers::mission_logs::list_logs))
        // Weekly pipeline
        .route("/api/weekly/status", get(handlers::weekly::weekly_status))
        .route("/api/weekly/evaluate", post(handlers::weekly::evaluate_week))
        .route("/api/weekly/select", post(handlers::weekly::select_weekly_badge))
        .route("/api/weekly/goal", get(handlers::weekly::get_reward_goal))
        .route("/api/weekly/goal", put(handlers::weekly::upsert_reward_goal))
        // Notifications
        .route("/api/notifications", get(handlers::notifications::queue_state))
        .route(
            "/api/notifications/process",
            post(handlers::notifications::process_next),
        )
        // Badges
        .route("/api/badges", get(handlers::badges::list_badges))
        .route("/api/badges", post(handlers::badges::create_badge))
        .route("/api/badges/earned", get(handlers::badges::list_earned))
        .route(
            "/api/badges/earned/:id/use",
            post(handlers::badges::use_reward),
        )
        .route("/api/badges/weekly-pool", get(handlers::badges::get_weekly_pool))
        .route("/api/badges/weekly-pool", put(handlers::badges::put_weekly_pool))
        .route("/api/badges/:id", delete(handlers::badges::delete_badge))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_url
                .parse::<axum::http::HeaderValue>()
                .expect("FRONTEND_URL must be a valid origin"),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    // Client IPs feed the login rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}
