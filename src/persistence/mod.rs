// src/persistence/mod.rs

//! Durable quiz storage. The schema belongs to the quiz management service;
//! the session engine only reads quizzes and users and appends attempts and answers.

mod memory;
mod postgres;

pub use memory::MemoryPersistence;
pub use postgres::PgPersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::quiz::{AnswerRecord, Attempt, Quiz, QuizState, UserProfile},
};

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, AppError>;
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, AppError>;
    /// An attempt that is `yet_to_start` or `ongoing`.
    async fn find_open_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> Result<Option<Attempt>, AppError>;
    async fn create_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Attempt, AppError>;
    async fn record_answer(&self, answer: &AnswerRecord) -> Result<(), AppError>;
    /// Adds `score_delta` to the attempt and marks it ongoing.
    async fn update_attempt(&self, attempt_id: &str, score_delta: f64) -> Result<(), AppError>;
    async fn set_quiz_state(&self, quiz_id: &str, state: QuizState) -> Result<(), AppError>;
    async fn complete_attempts(&self, quiz_id: &str) -> Result<(), AppError>;
}

/// Returns the participant's open attempt, creating one if needed.
/// Joining twice yields the same attempt id.
pub async fn ensure_attempt(
    persistence: &dyn Persistence,
    user_id: &str,
    quiz_id: &str,
    started_at: DateTime<Utc>,
) -> Result<Attempt, AppError> {
    if let Some(attempt) = persistence.find_open_attempt(user_id, quiz_id).await? {
        return Ok(attempt);
    }
    persistence.create_attempt(user_id, quiz_id, started_at).await
}
