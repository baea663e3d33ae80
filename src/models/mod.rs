// src/models/mod.rs

pub mod leaderboard;
pub mod message;
pub mod participant;
pub mod question;
pub mod quiz;
