// src/models/question.rs

use serde::{Deserialize, Serialize};

/// Lifecycle of a question inside a running quiz.
/// A question moves from `Pending` to `Served` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Served,
}

/// Runtime projection of a question, as cached in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,

    /// The text content of the question.
    pub question: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    pub options: Vec<String>,

    /// Index of the correct option. Never leaves the server.
    pub answer_index: usize,

    /// Points awarded for a correct answer before the speed bonus.
    pub marks: f64,

    /// Allotted time in seconds.
    pub time_limit: u64,

    #[serde(default)]
    pub status: QuestionStatus,
}

/// DTO for sending a question to players (excludes the answer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub time_limit: u64,
    pub marks: f64,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question: q.question.clone(),
            options: q.options.clone(),
            time_limit: q.time_limit,
            marks: q.marks,
        }
    }
}

/// The quiz blob cached per quiz: the ordered question list with statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizData {
    pub quiz_id: String,
    pub title: String,
    pub questions: Vec<Question>,
}

/// Outcome of scoring one answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub correct: bool,
    pub score: f64,
    /// Seconds between the question being served and the answer.
    pub time_taken: u64,
}
