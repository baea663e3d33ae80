// src/services/mod.rs

pub mod leaderboard;
pub mod questions;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::AppError;

/// Serialises a value for the store. Failures are internal errors.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Decodes a value read back from the store.
pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::InternalServerError(e.to_string()))
}
