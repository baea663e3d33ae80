// src/services/leaderboard.rs

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::leaderboard::LeaderboardEntry,
    store::{Store, keys},
};

/// Ranking of one quiz's participants by cumulative score.
///
/// Ranks are 0-based with the highest score first. Callers publish a
/// ranking-changed event after mutating scores.
#[async_trait]
pub trait LeaderboardService: Send + Sync {
    /// Inserts the participant with `score` if absent. Returns whether it was inserted.
    async fn add_member(&self, participant_id: &str, score: f64) -> Result<bool, AppError>;
    /// Atomically adds `delta`, creating the entry when missing. Returns the new score.
    async fn increment_score(&self, participant_id: &str, delta: f64) -> Result<f64, AppError>;
    async fn get_score(&self, participant_id: &str) -> Result<Option<f64>, AppError>;
    async fn get_rank(&self, participant_id: &str) -> Result<Option<usize>, AppError>;
    async fn get_top_n(&self, n: usize) -> Result<Vec<LeaderboardEntry>, AppError>;
    /// `count` entries starting at 0-based rank `start`.
    async fn get_range(&self, start: usize, count: usize)
    -> Result<Vec<LeaderboardEntry>, AppError>;
    async fn size(&self) -> Result<usize, AppError>;
    async fn remove_member(&self, participant_id: &str) -> Result<bool, AppError>;
    /// Publishes a ranking snapshot on this quiz's leaderboard channel.
    async fn publish(&self, entries: &[LeaderboardEntry]) -> Result<(), AppError>;
    fn channel(&self) -> String;
}

/// Sorted-set backed leaderboard.
pub struct StoreLeaderboard {
    store: Arc<dyn Store>,
    key: String,
    channel: String,
}

impl StoreLeaderboard {
    pub fn new(store: Arc<dyn Store>, quiz_id: &str) -> Self {
        Self {
            store,
            key: keys::leaderboard(quiz_id),
            channel: keys::leaderboard_channel(quiz_id),
        }
    }
}

fn to_entries(rows: Vec<(String, f64)>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .map(|(participant_id, score)| LeaderboardEntry {
            participant_id,
            score,
        })
        .collect()
}

#[async_trait]
impl LeaderboardService for StoreLeaderboard {
    async fn add_member(&self, participant_id: &str, score: f64) -> Result<bool, AppError> {
        self.store.zadd_nx(&self.key, participant_id, score).await
    }

    async fn increment_score(&self, participant_id: &str, delta: f64) -> Result<f64, AppError> {
        self.store.zincrby(&self.key, participant_id, delta).await
    }

    async fn get_score(&self, participant_id: &str) -> Result<Option<f64>, AppError> {
        self.store.zscore(&self.key, participant_id).await
    }

    async fn get_rank(&self, participant_id: &str) -> Result<Option<usize>, AppError> {
        self.store.zrevrank(&self.key, participant_id).await
    }

    async fn get_top_n(&self, n: usize) -> Result<Vec<LeaderboardEntry>, AppError> {
        self.get_range(0, n).await
    }

    async fn get_range(
        &self,
        start: usize,
        count: usize,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let Some(stop) = start.checked_add(count - 1) else {
            return Ok(Vec::new());
        };
        let rows = self.store.zrevrange(&self.key, start, stop).await?;
        Ok(to_entries(rows))
    }

    async fn size(&self) -> Result<usize, AppError> {
        self.store.zcard(&self.key).await
    }

    async fn remove_member(&self, participant_id: &str) -> Result<bool, AppError> {
        self.store.zrem(&self.key, participant_id).await
    }

    async fn publish(&self, entries: &[LeaderboardEntry]) -> Result<(), AppError> {
        let payload = serde_json::to_string(entries)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        self.store.publish(&self.channel, &payload).await
    }

    fn channel(&self) -> String {
        self.channel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures::StreamExt;

    fn leaderboard() -> (Arc<MemoryStore>, StoreLeaderboard) {
        let store = Arc::new(MemoryStore::new());
        let lb = StoreLeaderboard::new(store.clone(), "quiz-1");
        (store, lb)
    }

    #[tokio::test]
    async fn increment_initialises_missing_member() {
        let (_, lb) = leaderboard();
        assert_eq!(lb.get_score("u1").await.unwrap(), None);

        let score = lb.increment_score("u1", 12.5).await.unwrap();
        assert_eq!(score, 12.5);
        assert_eq!(lb.increment_score("u1", 0.0).await.unwrap(), 12.5);
        assert_eq!(lb.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ranks_are_zero_based_and_descending() {
        let (_, lb) = leaderboard();
        lb.increment_score("low", 1.0).await.unwrap();
        lb.increment_score("high", 30.0).await.unwrap();
        lb.increment_score("mid", 15.0).await.unwrap();

        assert_eq!(lb.get_rank("high").await.unwrap(), Some(0));
        assert_eq!(lb.get_rank("mid").await.unwrap(), Some(1));
        assert_eq!(lb.get_rank("low").await.unwrap(), Some(2));

        let top = lb.get_top_n(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].participant_id, "high");
        assert_eq!(top[1].participant_id, "mid");

        let tail = lb.get_range(1, 5).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].participant_id, "mid");
    }

    #[tokio::test]
    async fn range_past_the_end_is_empty() {
        let (_, lb) = leaderboard();
        lb.increment_score("u1", 1.0).await.unwrap();

        assert!(lb.get_range(5, 10).await.unwrap().is_empty());
        assert!(lb.get_range(usize::MAX, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tie_order_is_stable_across_queries() {
        let (_, lb) = leaderboard();
        for id in ["a", "b", "c"] {
            lb.increment_score(id, 10.0).await.unwrap();
        }
        let first = lb.get_top_n(3).await.unwrap();
        let second = lb.get_top_n(3).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn add_member_does_not_overwrite() {
        let (_, lb) = leaderboard();
        assert!(lb.add_member("u1", 5.0).await.unwrap());
        assert!(!lb.add_member("u1", 0.0).await.unwrap());
        assert_eq!(lb.get_score("u1").await.unwrap(), Some(5.0));

        assert!(lb.remove_member("u1").await.unwrap());
        assert_eq!(lb.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn publish_goes_to_quiz_channel() {
        let (store, lb) = leaderboard();
        let mut sub = store.subscribe(&[lb.channel()]).await.unwrap();

        let entries = vec![LeaderboardEntry {
            participant_id: "u1".to_string(),
            score: 3.0,
        }];
        lb.publish(&entries).await.unwrap();

        let msg = sub.next().await.unwrap();
        let decoded: Vec<LeaderboardEntry> = serde_json::from_str(&msg.payload).unwrap();
        assert_eq!(decoded, entries);
    }
}
