// src/services/questions.rs

use std::sync::Arc;

use async_trait::async_trait;

use super::{decode, encode};
use crate::{
    error::AppError,
    models::{
        message::ServerMessage,
        question::{Evaluation, PublicQuestion, Question, QuestionStatus, QuizData},
        quiz::Quiz,
    },
    store::{Store, keys},
};

/// Result of moving the rotation forward.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Serving(Question),
    Exhausted,
}

/// Drives a quiz through its questions.
///
/// The current question lives in a TTL-bearing store key; its expiry is the
/// only thing that moves the quiz forward after the first question.
#[async_trait]
pub trait QuestionService: Send + Sync {
    /// Caches the quiz with every question pending. No-op if already cached.
    async fn load(&self, quiz: &Quiz) -> Result<bool, AppError>;
    /// One-shot start marker. Returns false when the quiz was already started.
    async fn claim_start(&self) -> Result<bool, AppError>;
    /// Whether the start marker is set, including during the countdown.
    async fn is_started(&self) -> Result<bool, AppError>;
    /// Serves the next pending question, or reports that none are left.
    /// Fails while a current question is still live.
    async fn advance(&self) -> Result<Advance, AppError>;
    /// Reacts to an expired-key event. Only one caller across all processes
    /// advances for a given expiry; everyone else gets `None`.
    async fn handle_expiry(&self, expired_key: &str) -> Result<Option<Advance>, AppError>;
    async fn current_question(&self) -> Result<Option<Question>, AppError>;
    /// Scores an answer against the live question. `None` when `question_id`
    /// is not the question being served.
    async fn evaluate(&self, question_id: &str, answer: usize)
    -> Result<Option<Evaluation>, AppError>;
    /// Records that a participant answered a question. False on repeats.
    async fn record_submission(&self, question_id: &str, participant_id: &str)
    -> Result<bool, AppError>;
    /// Publishes a frame on the quiz's update channel.
    async fn publish_update(&self, update: &ServerMessage) -> Result<(), AppError>;
    fn question_channel(&self) -> String;
    fn update_channel(&self) -> String;
}

/// Speed-weighted score. A correct answer earns its marks plus up to a third
/// of the time limit, proportional to the fraction of time remaining.
pub fn score_answer(question: &Question, selected: usize, remaining_secs: u64) -> Evaluation {
    let remaining = remaining_secs.min(question.time_limit);
    let time_taken = question.time_limit - remaining;

    if selected != question.answer_index {
        return Evaluation {
            correct: false,
            score: 0.0,
            time_taken,
        };
    }

    let limit = question.time_limit as f64;
    let bonus = if question.time_limit == 0 {
        0.0
    } else {
        (remaining as f64 / limit) * (limit / 3.0)
    };

    Evaluation {
        correct: true,
        score: question.marks + bonus,
        time_taken,
    }
}

pub struct StoreQuestionRotation {
    store: Arc<dyn Store>,
    quiz_id: String,
    grace_secs: u64,
}

impl StoreQuestionRotation {
    pub fn new(store: Arc<dyn Store>, quiz_id: &str, grace_secs: u64) -> Self {
        Self {
            store,
            quiz_id: quiz_id.to_string(),
            grace_secs,
        }
    }

    fn current_key(&self) -> String {
        keys::current_question(&self.quiz_id)
    }
}

#[async_trait]
impl QuestionService for StoreQuestionRotation {
    async fn load(&self, quiz: &Quiz) -> Result<bool, AppError> {
        if quiz.questions.is_empty() {
            return Err(AppError::BadRequest(
                "Either Quiz not found or it does not have any questions".to_string(),
            ));
        }

        let data = QuizData {
            quiz_id: quiz.id.clone(),
            title: quiz.title.clone(),
            questions: quiz
                .questions
                .iter()
                .cloned()
                .map(|mut q| {
                    q.status = QuestionStatus::Pending;
                    q
                })
                .collect(),
        };

        let cached = self
            .store
            .set_nx(&keys::quiz_data(&self.quiz_id), &encode(&data)?)
            .await?;
        if cached {
            tracing::info!("Cached quiz {} with {} questions", quiz.id, data.questions.len());
        }
        Ok(cached)
    }

    async fn claim_start(&self) -> Result<bool, AppError> {
        self.store.set_nx(&keys::started(&self.quiz_id), "1").await
    }

    async fn is_started(&self) -> Result<bool, AppError> {
        self.store.exists(&keys::started(&self.quiz_id)).await
    }

    async fn advance(&self) -> Result<Advance, AppError> {
        let current_key = self.current_key();
        if self.store.exists(&current_key).await? {
            return Err(AppError::Conflict(
                "A question is still being served".to_string(),
            ));
        }

        let data_key = keys::quiz_data(&self.quiz_id);
        let Some(raw) = self.store.get(&data_key).await? else {
            return Err(AppError::NotFound(format!(
                "Quiz {} is not cached",
                self.quiz_id
            )));
        };
        let mut data: QuizData = decode(&raw)?;

        let Some(next) = data
            .questions
            .iter_mut()
            .find(|q| q.status == QuestionStatus::Pending)
        else {
            tracing::info!("Quiz {} has no questions left", self.quiz_id);
            return Ok(Advance::Exhausted);
        };
        next.status = QuestionStatus::Served;
        let question = next.clone();

        self.store.set(&data_key, &encode(&data)?).await?;
        self.store
            .set_ex(
                &current_key,
                &encode(&question)?,
                question.time_limit + self.grace_secs,
            )
            .await?;
        self.store
            .set(&keys::advance_token(&self.quiz_id), &question.id)
            .await?;

        let frame = ServerMessage::NewQuestion(PublicQuestion::from(&question));
        self.store
            .publish(&self.question_channel(), &encode(&frame)?)
            .await?;

        tracing::info!(
            "Quiz {} serving question {} for {}s",
            self.quiz_id,
            question.id,
            question.time_limit
        );
        Ok(Advance::Serving(question))
    }

    async fn handle_expiry(&self, expired_key: &str) -> Result<Option<Advance>, AppError> {
        let current_key = self.current_key();
        if expired_key != current_key {
            return Ok(None);
        }

        let token_key = keys::advance_token(&self.quiz_id);
        if !self.store.claim(&token_key, &current_key).await? {
            tracing::debug!("Expiry of {} handled elsewhere", current_key);
            return Ok(None);
        }

        self.advance().await.map(Some)
    }

    async fn current_question(&self) -> Result<Option<Question>, AppError> {
        match self.store.get(&self.current_key()).await? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn evaluate(
        &self,
        question_id: &str,
        answer: usize,
    ) -> Result<Option<Evaluation>, AppError> {
        let Some(question) = self.current_question().await? else {
            return Ok(None);
        };
        if question.id != question_id {
            return Ok(None);
        }

        let remaining = self.store.ttl(&self.current_key()).await?.unwrap_or(0);
        Ok(Some(score_answer(&question, answer, remaining)))
    }

    async fn record_submission(
        &self,
        question_id: &str,
        participant_id: &str,
    ) -> Result<bool, AppError> {
        let key = keys::answered(&self.quiz_id, question_id);
        let first = self.store.sadd(&key, participant_id).await?;
        if first {
            if let Some(ttl) = self.store.ttl(&self.current_key()).await? {
                self.store.expire(&key, ttl + self.grace_secs).await?;
            }
        }
        Ok(first)
    }

    async fn publish_update(&self, update: &ServerMessage) -> Result<(), AppError> {
        self.store
            .publish(&self.update_channel(), &encode(update)?)
            .await
    }

    fn question_channel(&self) -> String {
        keys::question_channel(&self.quiz_id)
    }

    fn update_channel(&self) -> String {
        keys::update_channel(&self.quiz_id)
    }
}
