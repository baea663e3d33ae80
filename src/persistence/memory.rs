// src/persistence/memory.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Persistence;
use crate::{
    error::AppError,
    models::quiz::{AnswerRecord, Attempt, Quiz, QuizState, UserProfile},
};

#[derive(Default)]
struct Tables {
    quizzes: HashMap<String, Quiz>,
    users: HashMap<String, UserProfile>,
    attempts: Vec<Attempt>,
    answers: Vec<AnswerRecord>,
}

/// In-memory persistence for tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_quiz(&self, quiz: Quiz) {
        self.tables.lock().await.quizzes.insert(quiz.id.clone(), quiz);
    }

    pub async fn insert_user(&self, user: UserProfile) {
        self.tables.lock().await.users.insert(user.id.clone(), user);
    }

    pub async fn attempts(&self) -> Vec<Attempt> {
        self.tables.lock().await.attempts.clone()
    }

    pub async fn answers(&self) -> Vec<AnswerRecord> {
        self.tables.lock().await.answers.clone()
    }

    pub async fn quiz_state(&self, quiz_id: &str) -> Option<QuizState> {
        self.tables.lock().await.quizzes.get(quiz_id).map(|q| q.state)
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn get_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.lock().await.quizzes.get(quiz_id).cloned())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        Ok(self.tables.lock().await.users.get(user_id).cloned())
    }

    async fn find_open_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> Result<Option<Attempt>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attempts
            .iter()
            .find(|a| {
                a.user_id == user_id && a.quiz_id == quiz_id && a.state != QuizState::Completed
            })
            .cloned())
    }

    async fn create_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Attempt, AppError> {
        let attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            quiz_id: quiz_id.to_string(),
            state: QuizState::YetToStart,
            score: 0.0,
            started_at,
            completed_at: None,
        };
        self.tables.lock().await.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn record_answer(&self, answer: &AnswerRecord) -> Result<(), AppError> {
        self.tables.lock().await.answers.push(answer.clone());
        Ok(())
    }

    async fn update_attempt(&self, attempt_id: &str, score_delta: f64) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let attempt = tables
            .attempts
            .iter_mut()
            .find(|a| a.id == attempt_id)
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

        attempt.score += score_delta;
        attempt.state = QuizState::Ongoing;
        attempt.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn set_quiz_state(&self, quiz_id: &str, state: QuizState) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let quiz = tables
            .quizzes
            .get_mut(quiz_id)
            .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;
        quiz.state = state;
        Ok(())
    }

    async fn complete_attempts(&self, quiz_id: &str) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        for attempt in tables.attempts.iter_mut().filter(|a| a.quiz_id == quiz_id) {
            attempt.state = QuizState::Completed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::ensure_attempt;

    #[tokio::test]
    async fn ensure_attempt_is_idempotent() {
        let db = MemoryPersistence::new();
        let first = ensure_attempt(&db, "u1", "quiz-1", Utc::now()).await.unwrap();
        let second = ensure_attempt(&db, "u1", "quiz-1", Utc::now()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(db.attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn completed_attempts_are_not_reused() {
        let db = MemoryPersistence::new();
        let first = ensure_attempt(&db, "u1", "quiz-1", Utc::now()).await.unwrap();
        db.complete_attempts("quiz-1").await.unwrap();
        let second = ensure_attempt(&db, "u1", "quiz-1", Utc::now()).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn update_attempt_accumulates_score() {
        let db = MemoryPersistence::new();
        let attempt = db.create_attempt("u1", "quiz-1", Utc::now()).await.unwrap();
        db.update_attempt(&attempt.id, 12.0).await.unwrap();
        db.update_attempt(&attempt.id, 3.5).await.unwrap();

        let stored = &db.attempts().await[0];
        assert_eq!(stored.score, 15.5);
        assert_eq!(stored.state, QuizState::Ongoing);
        assert!(db.update_attempt("missing", 1.0).await.is_err());
    }
}
