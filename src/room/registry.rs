// src/room/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ClientHandle, Room, relay, rotation};
use crate::{
    config::Config,
    error::AppError,
    models::message::{ServerMessage, UserLeftPayload},
    persistence::Persistence,
    services::{leaderboard::StoreLeaderboard, questions::StoreQuestionRotation},
    store::Store,
};

/// Rooms this process is serving, keyed by quiz id.
///
/// A room exists while at least one local client is connected to it; the
/// first join creates it together with its store subscriptions.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    store: Arc<dyn Store>,
    persistence: Arc<dyn Persistence>,
    config: Config,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn Store>, persistence: Arc<dyn Persistence>, config: Config) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
            persistence,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn get(&self, quiz_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(quiz_id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Returns the quiz's room, creating it and its subscriptions on first use.
    /// Subscribing happens outside the registry lock; if another join wins the
    /// race, the room opened here is shut down and the winner returned.
    pub async fn ensure_room(self: &Arc<Self>, quiz_id: &str) -> Result<Arc<Room>, AppError> {
        if let Some(room) = self.get(quiz_id).await {
            return Ok(room);
        }
        let opened = self.open_room(quiz_id).await?;

        let mut rooms = self.rooms.write().await;
        if let Some(existing) = rooms.get(quiz_id) {
            let existing = Arc::clone(existing);
            drop(rooms);
            opened.shutdown().await;
            return Ok(existing);
        }
        rooms.insert(quiz_id.to_string(), Arc::clone(&opened));
        Ok(opened)
    }

    /// Registers a client in the quiz's room. Registration re-checks the room
    /// under the registry lock so a concurrent teardown cannot strand the client.
    pub async fn add_client(
        self: &Arc<Self>,
        quiz_id: &str,
        client: ClientHandle,
    ) -> Result<Arc<Room>, AppError> {
        let (room, replaced) = loop {
            let room = self.ensure_room(quiz_id).await?;
            let rooms = self.rooms.write().await;
            if rooms.get(quiz_id).is_some_and(|r| Arc::ptr_eq(r, &room)) {
                let replaced = room.add_client(client.clone()).await;
                break (room, replaced);
            }
            tracing::debug!("Room for quiz {} closed during join, reopening", quiz_id);
        };

        let user_id = client.user_id.clone();
        let connection_id = client.connection_id;
        if let Some(previous) = replaced.filter(|p| p.connection_id != connection_id) {
            tracing::info!(
                "User {} reconnected to quiz {}, replacing connection {}",
                user_id,
                quiz_id,
                previous.connection_id
            );
            previous.close();
        }
        Ok(room)
    }

    /// Drops a disconnected socket. Publishes USER_LEFT once and tears the room
    /// down when its last local client is gone.
    pub async fn disconnect(
        &self,
        quiz_id: &str,
        user_id: &str,
        connection_id: Uuid,
    ) -> Result<(), AppError> {
        let Some(room) = self.get(quiz_id).await else {
            return Ok(());
        };
        if !room.remove_client(user_id, connection_id).await {
            return Ok(());
        }
        tracing::info!("User {} left quiz {}", user_id, quiz_id);

        let left = ServerMessage::UserLeft(UserLeftPayload {
            quiz_id: quiz_id.to_string(),
            user_id: user_id.to_string(),
        });
        let published = room.questions.publish_update(&left).await;

        let mut rooms = self.rooms.write().await;
        let idle = match rooms.get(quiz_id) {
            Some(current) => Arc::ptr_eq(current, &room) && room.is_empty().await,
            None => false,
        };
        if idle {
            rooms.remove(quiz_id);
            drop(rooms);
            tracing::info!("No local clients left in quiz {}, closing room", quiz_id);
            room.shutdown().await;
        }

        published
    }

    /// Removes the room and closes every local socket in it.
    pub async fn teardown(&self, quiz_id: &str) {
        let removed = self.rooms.write().await.remove(quiz_id);
        if let Some(room) = removed {
            tracing::info!("Tearing down room for quiz {}", quiz_id);
            room.shutdown().await;
        }
    }

    /// Like `teardown`, but leaves a newer room for the same quiz untouched.
    pub(crate) async fn teardown_room(&self, room: &Arc<Room>) {
        let mut rooms = self.rooms.write().await;
        let current = rooms
            .get(&room.quiz_id)
            .is_some_and(|r| Arc::ptr_eq(r, room));
        if current {
            rooms.remove(&room.quiz_id);
        }
        drop(rooms);

        tracing::info!("Tearing down room for quiz {}", room.quiz_id);
        room.shutdown().await;
    }

    async fn open_room(self: &Arc<Self>, quiz_id: &str) -> Result<Arc<Room>, AppError> {
        let room = Arc::new(Room::new(
            quiz_id,
            Arc::new(StoreLeaderboard::new(Arc::clone(&self.store), quiz_id)),
            Arc::new(StoreQuestionRotation::new(
                Arc::clone(&self.store),
                quiz_id,
                self.config.question_grace_secs,
            )),
        ));

        // one subscription for all three channels keeps their relative order
        let channels = [
            room.questions.question_channel(),
            room.questions.update_channel(),
            room.leaderboard.channel(),
        ];
        let messages = self.store.subscribe(&channels).await?;
        let expired = self.store.subscribe(&[self.store.expiry_channel()]).await?;

        room.spawn(relay::run(Arc::clone(self), Arc::clone(&room), messages))
            .await;
        room.spawn(rotation::watch_expiry(
            Arc::clone(self),
            Arc::clone(&room),
            expired,
        ))
        .await;

        tracing::info!("Opened room for quiz {}", quiz_id);
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{LEADERBOARD_TOP_N, QUESTION_GRACE_SECS, QUIZ_RETENTION_SECS, START_COUNTDOWN_SECS},
        persistence::MemoryPersistence,
        room::Outbound,
        store::MemoryStore,
    };
    use tokio::sync::mpsc;

    fn registry() -> Arc<RoomRegistry> {
        let config = Config {
            redis_url: String::new(),
            database_url: String::new(),
            jwt_secret: "secret".to_string(),
            rust_log: "error".to_string(),
            port: 0,
            start_countdown_secs: START_COUNTDOWN_SECS,
            question_grace_secs: QUESTION_GRACE_SECS,
            leaderboard_top_n: LEADERBOARD_TOP_N,
            retention_secs: QUIZ_RETENTION_SECS,
        };
        Arc::new(RoomRegistry::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryPersistence::new()),
            config,
        ))
    }

    fn client(user_id: &str) -> (ClientHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientHandle::new(Uuid::new_v4(), user_id, false, tx), rx)
    }

    #[tokio::test]
    async fn ensure_room_creates_one_room_per_quiz() {
        let registry = registry();
        let a = registry.ensure_room("quiz-1").await.unwrap();
        let b = registry.ensure_room("quiz-1").await.unwrap();
        registry.ensure_room("quiz-2").await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.room_count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_joins_share_one_room() {
        let registry = registry();
        let (alice, _alice_rx) = client("alice");
        let (bob, _bob_rx) = client("bob");

        let (a, b) = tokio::join!(
            registry.add_client("quiz-1", alice),
            registry.add_client("quiz-1", bob)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(a.clients().await.len(), 2);
    }

    #[tokio::test]
    async fn teardown_closes_local_sockets() {
        let registry = registry();
        let (alice, mut rx) = client("alice");
        registry.add_client("quiz-1", alice).await.unwrap();

        registry.teardown("quiz-1").await;

        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert!(registry.get("quiz-1").await.is_none());
    }

    #[tokio::test]
    async fn broadcast_skips_closed_sockets() {
        let registry = registry();
        let (alice, mut alice_rx) = client("alice");
        let (bob, bob_rx) = client("bob");
        let room = registry.add_client("quiz-1", alice).await.unwrap();
        registry.add_client("quiz-1", bob).await.unwrap();
        drop(bob_rx);

        let delivered = room.broadcast(&ServerMessage::error("hello")).await;

        assert_eq!(delivered, 1);
        assert_eq!(
            alice_rx.recv().await,
            Some(Outbound::Message(ServerMessage::error("hello")))
        );
    }

    #[tokio::test]
    async fn stale_connection_cannot_remove_its_replacement() {
        let registry = registry();
        let (old, mut old_rx) = client("alice");
        let (new, _new_rx) = client("alice");
        let old_id = old.connection_id;
        let new_id = new.connection_id;
        let room = registry.add_client("quiz-1", old).await.unwrap();
        registry.add_client("quiz-1", new).await.unwrap();
        assert_eq!(old_rx.recv().await, Some(Outbound::Close));

        registry.disconnect("quiz-1", "alice", old_id).await.unwrap();

        assert_eq!(room.client("alice").await.map(|c| c.connection_id), Some(new_id));
        assert_eq!(registry.room_count().await, 1);
    }
}
