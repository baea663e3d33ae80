// src/models/leaderboard.rs

use serde::{Deserialize, Serialize};

/// One row of the ranked sorted set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub participant_id: String,
    pub score: f64,
}

/// The recipient's own standing. `rank` is 1-based; -1 means unranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfScore {
    pub user_id: String,
    pub rank: i64,
    pub score: f64,
}

impl SelfScore {
    pub fn new(user_id: &str, rank: Option<usize>, score: Option<f64>) -> Self {
        Self {
            user_id: user_id.to_string(),
            rank: rank.map(|r| r as i64 + 1).unwrap_or(-1),
            score: score.unwrap_or(-1.0),
        }
    }
}

/// Personalised leaderboard frame payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPayload {
    pub quiz_id: String,
    pub top_players: Vec<LeaderboardEntry>,
    /// `None` for hosts.
    pub self_score: Option<SelfScore>,
}
