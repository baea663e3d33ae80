// src/room/relay.rs

//! Fans store pub/sub messages out to the room's local sockets.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::StreamExt;

use super::{Room, RoomRegistry};
use crate::{
    models::{
        leaderboard::{LeaderboardEntry, LeaderboardPayload, SelfScore},
        message::{QuizStartedPayload, ServerMessage},
    },
    persistence::ensure_attempt,
    store::MessageStream,
};

pub(crate) async fn run(registry: Arc<RoomRegistry>, room: Arc<Room>, mut messages: MessageStream) {
    let question_channel = room.questions.question_channel();
    let update_channel = room.questions.update_channel();
    let leaderboard_channel = room.leaderboard.channel();

    while let Some(message) = messages.next().await {
        if message.channel == question_channel {
            relay_frame(&room, &message.payload).await;
        } else if message.channel == update_channel {
            if relay_update(&registry, &room, &message.payload).await {
                registry.teardown_room(&room).await;
                break;
            }
        } else if message.channel == leaderboard_channel {
            relay_leaderboard(&room, &message.payload).await;
        }
    }

    tracing::debug!("Relay for quiz {} stopped", room.quiz_id);
}

fn parse_frame(quiz_id: &str, payload: &str) -> Option<ServerMessage> {
    match serde_json::from_str(payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!("Dropping malformed frame for quiz {}: {}", quiz_id, e);
            None
        }
    }
}

async fn relay_frame(room: &Room, payload: &str) {
    if let Some(frame) = parse_frame(&room.quiz_id, payload) {
        room.broadcast(&frame).await;
    }
}

/// Returns true when the quiz has ended and the room should close.
async fn relay_update(registry: &RoomRegistry, room: &Room, payload: &str) -> bool {
    let Some(frame) = parse_frame(&room.quiz_id, payload) else {
        return false;
    };

    match frame {
        ServerMessage::QuizStarted(started) => {
            deliver_quiz_started(registry, room, started).await;
            false
        }
        ServerMessage::QuizEnd(_) => {
            let delivered = room.broadcast(&frame).await;
            tracing::info!(
                "Quiz {} ended, notified {} local clients",
                room.quiz_id,
                delivered
            );
            true
        }
        other => {
            room.broadcast(&other).await;
            false
        }
    }
}

/// Every non-host recipient gets its own attempt id.
async fn deliver_quiz_started(registry: &RoomRegistry, room: &Room, started: QuizStartedPayload) {
    let countdown = registry.config().start_countdown_secs as i64;
    let started_at = Utc::now() + Duration::seconds(countdown);

    for client in room.clients().await {
        if client.is_host {
            client.send(ServerMessage::QuizStarted(started.clone()));
            continue;
        }

        match ensure_attempt(
            registry.persistence().as_ref(),
            &client.user_id,
            &room.quiz_id,
            started_at,
        )
        .await
        {
            Ok(attempt) => {
                client.send(ServerMessage::QuizStarted(QuizStartedPayload {
                    attempt_id: Some(attempt.id),
                    ..started.clone()
                }));
            }
            Err(e) => {
                tracing::error!(
                    "Failed to create attempt for {} on quiz {}: {}",
                    client.user_id,
                    room.quiz_id,
                    e
                );
                client.send(ServerMessage::error(e.client_message()));
            }
        }
    }
}

/// Wraps a published ranking into one frame per recipient, each carrying
/// the recipient's own rank and score.
async fn relay_leaderboard(room: &Room, payload: &str) {
    let top_players: Vec<LeaderboardEntry> = match serde_json::from_str(payload) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Dropping malformed leaderboard for quiz {}: {}", room.quiz_id, e);
            return;
        }
    };

    for client in room.clients().await {
        let self_score = if client.is_host {
            None
        } else {
            let rank = room.leaderboard.get_rank(&client.user_id).await;
            let score = room.leaderboard.get_score(&client.user_id).await;
            match (rank, score) {
                (Ok(rank), Ok(score)) => Some(SelfScore::new(&client.user_id, rank, score)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(
                        "Failed to read standing of {} in quiz {}: {}",
                        client.user_id,
                        room.quiz_id,
                        e
                    );
                    Some(SelfScore::new(&client.user_id, None, None))
                }
            }
        };

        client.send(ServerMessage::Leaderboard(LeaderboardPayload {
            quiz_id: room.quiz_id.clone(),
            top_players: top_players.clone(),
            self_score,
        }));
    }
}
