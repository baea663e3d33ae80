// src/config.rs

use std::env;
use std::str::FromStr;
use dotenvy::dotenv;

/// Countdown between QUIZ_STARTED and the first question.
pub const START_COUNTDOWN_SECS: u64 = 3;
/// Extra lifetime given to the current-question key on top of the question's time limit.
pub const QUESTION_GRACE_SECS: u64 = 3;
/// Size of the top-N slice published after every answer.
pub const LEADERBOARD_TOP_N: usize = 10;
/// How long the quiz keys survive in the store once the quiz has ended.
pub const QUIZ_RETENTION_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,
    pub start_countdown_secs: u64,
    pub question_grace_secs: u64,
    pub leaderboard_top_n: usize,
    pub retention_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let redis_url = env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Self {
            redis_url,
            database_url,
            jwt_secret,
            rust_log,
            port: env_or("PORT", 8000),
            start_countdown_secs: env_or("QUIZ_START_COUNTDOWN_SECS", START_COUNTDOWN_SECS),
            question_grace_secs: env_or("QUESTION_GRACE_SECS", QUESTION_GRACE_SECS),
            leaderboard_top_n: env_or("LEADERBOARD_TOP_N", LEADERBOARD_TOP_N),
            retention_secs: env_or("QUIZ_RETENTION_SECS", QUIZ_RETENTION_SECS),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
