// src/store/mod.rs

//! Shared store (Redis) access.
//!
//! Everything that must be visible across server processes lives here:
//! membership, the cached quiz, the current-question key, the leaderboard
//! sorted set and the pub/sub channels.
//!
//! ## Key Patterns
//!
//! ```text
//! quizData:{quiz_id}                      → cached quiz JSON (question list with statuses)
//! quiz:{quiz_id}:members                  → hash participant_id → participant JSON
//! quiz:{quiz_id}:currentQuestion          → current question JSON (TTL = time limit + grace)
//! quiz:{quiz_id}:started                  → set once when the host starts the quiz
//! quiz:{quiz_id}:advance                  → advance token, consumed by the first expiry handler
//! quiz:{quiz_id}:answered:{question_id}   → set of participants who answered
//! leaderboard:{quiz_id}                   → sorted set participant_id → score
//! ```
//!
//! Channels: `quiz:{quiz_id}:newQuestion`, `quiz:{quiz_id}:updates`,
//! `pubsub:{quiz_id}_leaderboard` and the keyspace feed `__keyevent@{db}__:expired`.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::AppError;

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMessage {
    pub channel: String,
    pub payload: String,
}

/// Live subscription. Dropping it unsubscribes.
pub type MessageStream = BoxStream<'static, StoreMessage>;

/// Operations the session engine needs from the shared store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError>;
    /// Sets the key only if absent. Returns whether it was set.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, AppError>;
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
    /// Remaining lifetime in seconds; `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, AppError>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), AppError>;
    async fn del(&self, key: &str) -> Result<bool, AppError>;

    /// Atomically deletes `token_key` provided `unless_key` does not exist.
    /// Returns true only for the caller that removed the token.
    async fn claim(&self, token_key: &str, unless_key: &str) -> Result<bool, AppError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError>;
    async fn hvals(&self, key: &str) -> Result<Vec<String>, AppError>;

    /// Returns true when the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, AppError>;

    /// Adds the member with `score` unless it is already present.
    async fn zadd_nx(&self, key: &str, member: &str, score: f64) -> Result<bool, AppError>;
    async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64, AppError>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, AppError>;
    /// 0-based rank, highest score first.
    async fn zrevrank(&self, key: &str, member: &str) -> Result<Option<usize>, AppError>;
    /// Inclusive range by descending rank.
    async fn zrevrange(&self, key: &str, start: usize, stop: usize)
    -> Result<Vec<(String, f64)>, AppError>;
    async fn zcard(&self, key: &str) -> Result<usize, AppError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, AppError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), AppError>;
    /// Subscribes to all `channels` on one connection; messages keep publish order.
    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, AppError>;

    /// Channel carrying the names of expired keys.
    fn expiry_channel(&self) -> String;
}

/// Key and channel names, namespaced by quiz id.
pub mod keys {
    pub fn quiz_data(quiz_id: &str) -> String {
        format!("quizData:{quiz_id}")
    }

    pub fn members(quiz_id: &str) -> String {
        format!("quiz:{quiz_id}:members")
    }

    pub fn current_question(quiz_id: &str) -> String {
        format!("quiz:{quiz_id}:currentQuestion")
    }

    pub fn started(quiz_id: &str) -> String {
        format!("quiz:{quiz_id}:started")
    }

    pub fn advance_token(quiz_id: &str) -> String {
        format!("quiz:{quiz_id}:advance")
    }

    pub fn answered(quiz_id: &str, question_id: &str) -> String {
        format!("quiz:{quiz_id}:answered:{question_id}")
    }

    pub fn leaderboard(quiz_id: &str) -> String {
        format!("leaderboard:{quiz_id}")
    }

    pub fn question_channel(quiz_id: &str) -> String {
        format!("quiz:{quiz_id}:newQuestion")
    }

    pub fn update_channel(quiz_id: &str) -> String {
        format!("quiz:{quiz_id}:updates")
    }

    pub fn leaderboard_channel(quiz_id: &str) -> String {
        format!("pubsub:{quiz_id}_leaderboard")
    }

    pub fn expiry_channel(db: i64) -> String {
        format!("__keyevent@{db}__:expired")
    }
}
