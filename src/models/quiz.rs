// src/models/quiz.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::question::Question;

/// State of a quiz as tracked by the persistence service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizState {
    YetToStart,
    Ongoing,
    Completed,
}

/// Attempts share the same three states as quizzes.
pub type AttemptState = QuizState;

impl QuizState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizState::YetToStart => "yet_to_start",
            QuizState::Ongoing => "ongoing",
            QuizState::Completed => "completed",
        }
    }
}

impl fmt::Display for QuizState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yet_to_start" => Ok(QuizState::YetToStart),
            "ongoing" => Ok(QuizState::Ongoing),
            "completed" => Ok(QuizState::Completed),
            other => Err(format!("unknown quiz state: {other}")),
        }
    }
}

/// A quiz with its questions, as returned by the persistence service.
#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    /// The owner hosts the live session.
    pub owner_id: String,
    pub state: QuizState,
    pub questions: Vec<Question>,
}

/// Identity details needed to build a participant record.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar: Option<String>,
}

/// One participant's run through one quiz.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub state: AttemptState,
    pub score: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Append-only record of one answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub attempt_id: String,
    pub question_id: String,
    pub selected: usize,
    pub is_correct: bool,
    pub marks_scored: f64,
    pub time_taken: u64,
}
