// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    services::questions::{QuestionService, StoreQuestionRotation},
    state::AppState,
    utils::jwt::Claims,
};

pub async fn health() -> &'static str {
    "OK"
}

/// Primes the store with the quiz so the first START_QUIZ does not pay for it.
/// Only the quiz owner may do this.
pub async fn cache_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = state
        .persistence
        .get_quiz(&quiz_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    if quiz.owner_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the quiz owner can cache it".to_string(),
        ));
    }

    let rotation = StoreQuestionRotation::new(
        Arc::clone(&state.store),
        &quiz.id,
        state.config.question_grace_secs,
    );
    let fresh = rotation.load(&quiz).await?;

    Ok(Json(json!({
        "cached": true,
        "alreadyCached": !fresh,
        "questions": quiz.questions.len(),
    })))
}
