// src/room/rotation.rs

//! Background tasks that move a quiz through its questions.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::{ClientHandle, Room, RoomRegistry};
use crate::{
    error::AppError,
    models::{
        message::{QuizEndPayload, ServerMessage},
        quiz::QuizState,
    },
    services::questions::Advance,
    store::{MessageStream, keys},
};

/// Watches expired-key events. When the current question's key expires the
/// next question is served, or the quiz is finished once none remain.
pub(crate) async fn watch_expiry(
    registry: Arc<RoomRegistry>,
    room: Arc<Room>,
    mut expired: MessageStream,
) {
    while let Some(event) = expired.next().await {
        match room.questions.handle_expiry(&event.payload).await {
            Ok(None) | Ok(Some(Advance::Serving(_))) => {}
            Ok(Some(Advance::Exhausted)) => {
                if let Err(e) = finish_quiz(&registry, &room).await {
                    tracing::error!("Failed to finish quiz {}: {}", room.quiz_id, e);
                }
                break;
            }
            Err(e) => {
                tracing::error!(
                    "Failed to advance quiz {} after expiry of {}: {}",
                    room.quiz_id,
                    event.payload,
                    e
                );
            }
        }
    }

    tracing::debug!("Expiry watcher for quiz {} stopped", room.quiz_id);
}

/// Waits out the start countdown, then serves the first question.
pub(crate) async fn countdown(registry: Arc<RoomRegistry>, room: Arc<Room>, host: ClientHandle) {
    tokio::time::sleep(Duration::from_secs(registry.config().start_countdown_secs)).await;

    let result = match room.questions.advance().await {
        Ok(Advance::Serving(_)) => registry
            .persistence()
            .set_quiz_state(&room.quiz_id, QuizState::Ongoing)
            .await,
        Ok(Advance::Exhausted) => Err(AppError::BadRequest(
            "Quiz does not have any questions".to_string(),
        )),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!("Failed to start quiz {}: {}", room.quiz_id, e);
        host.send(ServerMessage::error(e.client_message()));
    }
}

/// Publishes the final standings, retires the quiz keys and closes the quiz.
/// QUIZ_END goes out last: it tears down the local room, and this task with it.
async fn finish_quiz(registry: &RoomRegistry, room: &Room) -> Result<(), AppError> {
    let size = room.leaderboard.size().await?;
    let standings = room.leaderboard.get_range(0, size).await?;
    room.leaderboard.publish(&standings).await?;

    let store = registry.store();
    let retention = registry.config().retention_secs;
    for key in [
        keys::quiz_data(&room.quiz_id),
        keys::members(&room.quiz_id),
        keys::started(&room.quiz_id),
        keys::advance_token(&room.quiz_id),
        keys::leaderboard(&room.quiz_id),
    ] {
        store.expire(&key, retention).await?;
    }

    let persistence = registry.persistence();
    persistence
        .set_quiz_state(&room.quiz_id, QuizState::Completed)
        .await?;
    persistence.complete_attempts(&room.quiz_id).await?;

    tracing::info!(
        "Quiz {} finished with {} ranked participants",
        room.quiz_id,
        standings.len()
    );

    room.questions
        .publish_update(&ServerMessage::QuizEnd(QuizEndPayload {
            quiz_id: room.quiz_id.clone(),
            message: "Quiz has ended".to_string(),
        }))
        .await
}
