// src/models/message.rs

//! WebSocket frames. Every frame is `{"type": ..., "payload": {...}}`.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    leaderboard::{LeaderboardEntry, LeaderboardPayload},
    participant::Participant,
    question::PublicQuestion,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub quiz_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartQuizPayload {
    pub quiz_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub quiz_id: String,
    pub attempt_id: String,
    pub user_id: String,
    pub question_id: String,
    /// Index of the selected option.
    pub answer: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRequest {
    pub quiz_id: String,
    /// 1-based rank of the first row.
    #[validate(range(min = 1, max = 1_000_000))]
    pub start_rank: usize,
    #[validate(range(min = 1, max = 100))]
    pub count: usize,
}

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "JOIN_ROOM")]
    JoinRoom(JoinRoomPayload),
    #[serde(rename = "START_QUIZ")]
    StartQuiz(StartQuizPayload),
    #[serde(rename = "ANSWER")]
    Answer(AnswerPayload),
    #[serde(rename = "LEADERBOARD")]
    Leaderboard(LeaderboardRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersInRoomPayload {
    pub room_id: String,
    pub users: Vec<Participant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOngoingPayload {
    pub message: String,
    pub attempt_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStartedPayload {
    pub quiz_id: String,
    pub message: String,
    /// Filled in per recipient by the relay.
    pub attempt_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizEndPayload {
    pub quiz_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftPayload {
    pub quiz_id: String,
    pub user_id: String,
}

/// Server → client frames. The update channel carries these too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "NEW_QUESTION")]
    NewQuestion(PublicQuestion),
    #[serde(rename = "USERS_IN_ROOM")]
    UsersInRoom(UsersInRoomPayload),
    #[serde(rename = "NEW_USER")]
    NewUser { user: Participant },
    #[serde(rename = "USER_LEFT")]
    UserLeft(UserLeftPayload),
    #[serde(rename = "ANSWER_RECEIVED")]
    AnswerReceived { status: String },
    #[serde(rename = "ERROR")]
    Error { message: String },
    #[serde(rename = "Leaderboard")]
    Leaderboard(LeaderboardPayload),
    #[serde(rename = "Leaderboard_In_Range")]
    LeaderboardInRange { leaderboard: Vec<LeaderboardEntry> },
    #[serde(rename = "QUIZ_ONGOING")]
    QuizOngoing(QuizOngoingPayload),
    #[serde(rename = "QUIZ_STARTED")]
    QuizStarted(QuizStartedPayload),
    #[serde(rename = "QUIZ_END")]
    QuizEnd(QuizEndPayload),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_answer_frame() {
        let raw = json!({
            "type": "ANSWER",
            "payload": {
                "quizId": "q1",
                "attemptId": "a1",
                "userId": "u1",
                "questionId": "qq1",
                "answer": 2
            }
        });

        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Answer(AnswerPayload {
                quiz_id: "q1".to_string(),
                attempt_id: "a1".to_string(),
                user_id: "u1".to_string(),
                question_id: "qq1".to_string(),
                answer: 2,
            })
        );
    }

    #[test]
    fn rejects_unknown_type() {
        let raw = r#"{"type":"DANCE","payload":{}}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn rejects_missing_payload_fields() {
        let raw = r#"{"type":"JOIN_ROOM","payload":{"quizId":"q1"}}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn leaderboard_request_validation() {
        let ok = LeaderboardRequest {
            quiz_id: "q1".to_string(),
            start_rank: 1,
            count: 10,
        };
        assert!(ok.validate().is_ok());

        let zero_rank = LeaderboardRequest { start_rank: 0, ..ok.clone() };
        assert!(zero_rank.validate().is_err());

        let too_many = LeaderboardRequest { count: 500, ..ok };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn new_question_frame_has_no_answer() {
        let msg = ServerMessage::NewQuestion(PublicQuestion {
            id: "qq1".to_string(),
            question: "2 + 2?".to_string(),
            options: vec!["3".to_string(), "4".to_string()],
            time_limit: 30,
            marks: 10.0,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "NEW_QUESTION");
        assert_eq!(value["payload"]["timeLimit"], 30);
        assert!(value["payload"].get("answerIndex").is_none());
    }

    #[test]
    fn host_leaderboard_has_null_self_score() {
        let msg = ServerMessage::Leaderboard(LeaderboardPayload {
            quiz_id: "q1".to_string(),
            top_players: vec![],
            self_score: None,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "Leaderboard");
        assert!(value["payload"]["selfScore"].is_null());
    }
}
