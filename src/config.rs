use std::env;

use chrono::FixedOffset;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,

    /// Fixed UTC offset of the classroom zone in hours. Defaults to 9
    /// (Asia/Seoul, which observes no DST).
    pub tz_offset_hours: i32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "43200".into())
                .parse()
                .expect("JWT_ACCESS_TTL_SECS must be a number"),

            tz_offset_hours: env::var("TZ_OFFSET_HOURS")
                .unwrap_or_else(|_| "9".into())
                .parse()
                .expect("TZ_OFFSET_HOURS must be a number"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tz(&self) -> FixedOffset {
        FixedOffset::east_opt(self.tz_offset_hours * 3600)
            .expect("TZ_OFFSET_HOURS must be within -12..=14")
    }
}
