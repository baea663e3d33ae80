// src/handlers/session.rs

//! Handlers for the frames a connected client can send.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        message::{
            AnswerPayload, ClientMessage, JoinRoomPayload, LeaderboardRequest,
            QuizOngoingPayload, QuizStartedPayload, ServerMessage, StartQuizPayload,
            UsersInRoomPayload,
        },
        participant::Participant,
        quiz::{AnswerRecord, QuizState},
    },
    persistence::ensure_attempt,
    room::{ClientHandle, Outbound, Room},
    services::{
        decode, encode,
        leaderboard::{LeaderboardService, StoreLeaderboard},
    },
    state::AppState,
    store::keys,
};

/// One authenticated socket.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    pub user_id: String,
    /// Quiz the socket has joined, if any.
    pub quiz_id: Option<String>,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    pub fn new(user_id: &str, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            quiz_id: None,
            sender,
        }
    }

    pub fn reply(&self, message: ServerMessage) {
        if self.sender.send(Outbound::Message(message)).is_err() {
            tracing::debug!("Reply dropped, connection {} is closing", self.id);
        }
    }

    fn handle(&self, is_host: bool) -> ClientHandle {
        ClientHandle::new(self.id, &self.user_id, is_host, self.sender.clone())
    }

    fn ensure_same_user(&self, user_id: &str) -> Result<(), AppError> {
        if user_id != self.user_id {
            return Err(AppError::Forbidden(
                "userId does not match the authenticated user".to_string(),
            ));
        }
        Ok(())
    }
}

/// Routes a decoded frame. Failures are reported to the sender as an ERROR frame.
pub async fn dispatch(state: &AppState, conn: &mut Connection, message: ClientMessage) {
    let result = match message {
        ClientMessage::JoinRoom(payload) => join_room(state, conn, payload).await,
        ClientMessage::StartQuiz(payload) => start_quiz(state, conn, payload).await,
        ClientMessage::Answer(payload) => answer(state, conn, payload).await,
        ClientMessage::Leaderboard(payload) => leaderboard(state, conn, payload).await,
    };

    if let Err(e) = result {
        match &e {
            AppError::InternalServerError(msg) => {
                tracing::error!("Session error for {}: {}", conn.user_id, msg)
            }
            other => tracing::warn!("Rejected frame from {}: {}", conn.user_id, other),
        }
        conn.reply(ServerMessage::error(e.client_message()));
    }
}

/// Called once the socket is gone.
pub async fn disconnect(state: &AppState, conn: &Connection) {
    let Some(quiz_id) = &conn.quiz_id else {
        return;
    };
    if let Err(e) = state.registry.disconnect(quiz_id, &conn.user_id, conn.id).await {
        tracing::error!(
            "Failed to announce departure of {} from quiz {}: {}",
            conn.user_id,
            quiz_id,
            e
        );
    }
}

async fn join_room(
    state: &AppState,
    conn: &mut Connection,
    payload: JoinRoomPayload,
) -> Result<(), AppError> {
    conn.ensure_same_user(&payload.user_id)?;

    let quiz = state
        .persistence
        .get_quiz(&payload.quiz_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;
    if quiz.state == QuizState::Completed {
        return Err(AppError::Conflict("Quiz has already ended".to_string()));
    }

    let user = state
        .persistence
        .get_user(&conn.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let is_host = quiz.owner_id == conn.user_id;

    if let Some(previous) = conn.quiz_id.take() {
        if previous != quiz.id {
            state
                .registry
                .disconnect(&previous, &conn.user_id, conn.id)
                .await?;
        }
    }

    let room = state.registry.add_client(&quiz.id, conn.handle(is_host)).await?;
    conn.quiz_id = Some(quiz.id.clone());
    tracing::info!(
        "User {} joined quiz {}{}",
        conn.user_id,
        quiz.id,
        if is_host { " as host" } else { "" }
    );

    // the quiz stays yet_to_start in the database until the countdown ends
    let started = quiz.state == QuizState::Ongoing || room.questions.is_started().await?;
    if started && !is_host {
        let attempt =
            ensure_attempt(state.persistence.as_ref(), &conn.user_id, &quiz.id, Utc::now())
                .await?;
        conn.reply(ServerMessage::QuizOngoing(QuizOngoingPayload {
            message: "Quiz is already in progress, here is your attemptId".to_string(),
            attempt_id: attempt.id,
        }));
    }

    let participant = Participant::from_profile(&user, is_host);
    let members_key = keys::members(&quiz.id);
    state
        .store
        .hset(&members_key, &participant.id, &encode(&participant)?)
        .await?;
    room.questions
        .publish_update(&ServerMessage::NewUser { user: participant })
        .await?;

    let mut users = state
        .store
        .hvals(&members_key)
        .await?
        .iter()
        .map(|raw| decode::<Participant>(raw))
        .collect::<Result<Vec<_>, _>>()?;
    users.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    conn.reply(ServerMessage::UsersInRoom(UsersInRoomPayload {
        room_id: quiz.id,
        users,
    }));
    Ok(())
}

async fn start_quiz(
    state: &AppState,
    conn: &Connection,
    payload: StartQuizPayload,
) -> Result<(), AppError> {
    let room = joined_room(state, conn, &payload.quiz_id).await?;
    let host = room
        .client(&conn.user_id)
        .await
        .filter(|c| c.connection_id == conn.id)
        .ok_or_else(|| AppError::NotFound("Join the quiz before starting it".to_string()))?;
    if !host.is_host {
        return Err(AppError::Forbidden(
            "Only the host can start the quiz".to_string(),
        ));
    }

    let quiz = state
        .persistence
        .get_quiz(&payload.quiz_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;
    if quiz.state != QuizState::YetToStart {
        return Err(AppError::Conflict("Quiz has already been started".to_string()));
    }

    room.questions.load(&quiz).await?;
    if !room.questions.claim_start().await? {
        return Err(AppError::Conflict("Quiz has already been started".to_string()));
    }

    room.questions
        .publish_update(&ServerMessage::QuizStarted(QuizStartedPayload {
            quiz_id: quiz.id.clone(),
            message: "Quiz has started, here is the attemptId for the given quiz".to_string(),
            attempt_id: None,
        }))
        .await?;
    tracing::info!("Quiz {} started by {}", quiz.id, conn.user_id);

    room.spawn(crate::room::countdown(
        Arc::clone(&state.registry),
        Arc::clone(&room),
        host,
    ))
    .await;
    Ok(())
}

async fn answer(
    state: &AppState,
    conn: &Connection,
    payload: AnswerPayload,
) -> Result<(), AppError> {
    conn.ensure_same_user(&payload.user_id)?;
    let room = joined_room(state, conn, &payload.quiz_id).await?;
    if room.client(&conn.user_id).await.is_some_and(|c| c.is_host) {
        return Err(AppError::Forbidden(
            "The host cannot answer questions".to_string(),
        ));
    }

    let Some(evaluation) = room
        .questions
        .evaluate(&payload.question_id, payload.answer)
        .await?
    else {
        tracing::debug!(
            "Answer from {} for question {} which is not being served",
            conn.user_id,
            payload.question_id
        );
        return Err(AppError::BadRequest("Something went wrong.".to_string()));
    };

    let owns_attempt = state
        .persistence
        .find_open_attempt(&conn.user_id, &room.quiz_id)
        .await?
        .is_some_and(|attempt| attempt.id == payload.attempt_id);
    if !owns_attempt {
        return Err(AppError::Forbidden(
            "attemptId does not belong to the authenticated user".to_string(),
        ));
    }

    if !room
        .questions
        .record_submission(&payload.question_id, &conn.user_id)
        .await?
    {
        return Err(AppError::Conflict(
            "Answer already submitted for this question".to_string(),
        ));
    }

    room.leaderboard
        .increment_score(&conn.user_id, evaluation.score)
        .await?;
    let top = room
        .leaderboard
        .get_top_n(state.config.leaderboard_top_n)
        .await?;
    room.leaderboard.publish(&top).await?;

    state
        .persistence
        .record_answer(&AnswerRecord {
            attempt_id: payload.attempt_id.clone(),
            question_id: payload.question_id.clone(),
            selected: payload.answer,
            is_correct: evaluation.correct,
            marks_scored: evaluation.score,
            time_taken: evaluation.time_taken,
        })
        .await?;
    state
        .persistence
        .update_attempt(&payload.attempt_id, evaluation.score)
        .await?;

    conn.reply(ServerMessage::AnswerReceived {
        status: "ok".to_string(),
    });
    Ok(())
}

async fn leaderboard(
    state: &AppState,
    conn: &Connection,
    payload: LeaderboardRequest,
) -> Result<(), AppError> {
    payload.validate()?;

    let board = StoreLeaderboard::new(Arc::clone(&state.store), &payload.quiz_id);
    let rows = board
        .get_range(payload.start_rank - 1, payload.count)
        .await?;
    conn.reply(ServerMessage::LeaderboardInRange { leaderboard: rows });
    Ok(())
}

/// The room for `quiz_id`, provided this socket has joined it.
async fn joined_room(
    state: &AppState,
    conn: &Connection,
    quiz_id: &str,
) -> Result<Arc<Room>, AppError> {
    if conn.quiz_id.as_deref() != Some(quiz_id) {
        return Err(AppError::BadRequest("Join the quiz first".to_string()));
    }
    state
        .registry
        .get(quiz_id)
        .await
        .ok_or_else(|| AppError::NotFound("Quiz room not found".to_string()))
}
