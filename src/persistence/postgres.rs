// src/persistence/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use super::Persistence;
use crate::{
    error::AppError,
    models::{
        question::{Question, QuestionStatus},
        quiz::{AnswerRecord, Attempt, Quiz, QuizState, UserProfile},
    },
};

/// Helper struct for fetching quiz headers.
#[derive(FromRow)]
struct QuizRow {
    id: String,
    title: String,
    owner_id: String,
    state: String,
}

#[derive(FromRow)]
struct QuestionRow {
    id: String,
    question: String,
    options: Json<Vec<String>>,
    answer_index: i32,
    marks: f64,
    /// Seconds.
    time_limit: i32,
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    avatar: Option<String>,
}

#[derive(FromRow)]
struct AttemptRow {
    id: String,
    user_id: String,
    quiz_id: String,
    state: String,
    score: f64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

fn parse_state(raw: &str) -> Result<QuizState, AppError> {
    raw.parse().map_err(AppError::InternalServerError)
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            state: parse_state(&row.state)?,
            id: row.id,
            user_id: row.user_id,
            quiz_id: row.quiz_id,
            score: row.score,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Postgres-backed persistence.
#[derive(Clone)]
pub struct PgPersistence {
    pool: PgPool,
}

impl PgPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Persistence for PgPersistence {
    async fn get_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, AppError> {
        let Some(quiz) = sqlx::query_as::<_, QuizRow>(
            "SELECT id, title, owner_id, state FROM quizzes WHERE id = $1",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question, options, answer_index, marks, time_limit
            FROM questions
            WHERE quiz_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions for quiz {}: {:?}", quiz_id, e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(Some(Quiz {
            state: parse_state(&quiz.state)?,
            id: quiz.id,
            title: quiz.title,
            owner_id: quiz.owner_id,
            questions: questions
                .into_iter()
                .map(|q| Question {
                    id: q.id,
                    question: q.question,
                    options: q.options.0,
                    answer_index: q.answer_index.max(0) as usize,
                    marks: q.marks,
                    time_limit: q.time_limit.max(0) as u64,
                    status: QuestionStatus::Pending,
                })
                .collect(),
        }))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        let user = sqlx::query_as::<_, UserRow>(
            "SELECT id, first_name, last_name, email, avatar FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user.map(|u| UserProfile {
            id: u.id,
            first_name: u.first_name,
            last_name: u.last_name,
            email: u.email,
            avatar: u.avatar,
        }))
    }

    async fn find_open_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
    ) -> Result<Option<Attempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, user_id, quiz_id, state, score, started_at, completed_at
            FROM attempts
            WHERE user_id = $1 AND quiz_id = $2 AND state IN ('yet_to_start', 'ongoing')
            ORDER BY started_at
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Attempt::try_from).transpose()
    }

    async fn create_attempt(
        &self,
        user_id: &str,
        quiz_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Attempt, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO attempts (id, user_id, quiz_id, state, score, started_at)
            VALUES ($1, $2, $3, 'yet_to_start', 0, $4)
            RETURNING id, user_id, quiz_id, state, score, started_at, completed_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(quiz_id)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create attempt for {} on {}: {:?}", user_id, quiz_id, e);
            AppError::InternalServerError(e.to_string())
        })?;

        Attempt::try_from(row)
    }

    async fn record_answer(&self, answer: &AnswerRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO answers (id, attempt_id, question_id, selected, is_correct, marks_scored, time_taken)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&answer.attempt_id)
        .bind(&answer.question_id)
        .bind(answer.selected as i32)
        .bind(answer.is_correct)
        .bind(answer.marks_scored)
        .bind(answer.time_taken as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_attempt(&self, attempt_id: &str, score_delta: f64) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET score = score + $2, state = 'ongoing', completed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .bind(score_delta)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Attempt not found".to_string()));
        }
        Ok(())
    }

    async fn set_quiz_state(&self, quiz_id: &str, state: QuizState) -> Result<(), AppError> {
        sqlx::query("UPDATE quizzes SET state = $2 WHERE id = $1")
            .bind(quiz_id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_attempts(&self, quiz_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE attempts SET state = 'completed' WHERE quiz_id = $1")
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
