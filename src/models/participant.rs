// src/models/participant.rs

use serde::{Deserialize, Serialize};

use crate::models::quiz::UserProfile;

/// Participant record kept in the quiz's membership hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub avatar: String,
    pub email: String,
    pub is_host: bool,
}

impl Participant {
    pub fn from_profile(user: &UserProfile, is_host: bool) -> Self {
        Self {
            id: user.id.clone(),
            display_name: format!("{} {}", user.first_name, user.last_name)
                .trim()
                .to_string(),
            avatar: user
                .avatar
                .clone()
                .unwrap_or_else(|| "No-Avatar".to_string()),
            email: user.email.clone(),
            is_host,
        }
    }
}
