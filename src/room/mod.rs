// src/room/mod.rs

//! Per-process rooms: the sockets this process holds for a quiz, plus the
//! service handles and background tasks that serve them.

mod registry;
mod relay;
mod rotation;

pub use registry::RoomRegistry;
pub(crate) use rotation::countdown;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::{
    models::message::ServerMessage,
    services::{leaderboard::LeaderboardService, questions::QuestionService},
};

/// Instruction for a socket's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close,
}

/// Delivery handle for one connected socket.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub connection_id: Uuid,
    pub user_id: String,
    pub is_host: bool,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ClientHandle {
    pub fn new(
        connection_id: Uuid,
        user_id: &str,
        is_host: bool,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            connection_id,
            user_id: user_id.to_string(),
            is_host,
            sender,
        }
    }

    /// Queues a frame. Returns false when the socket is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        if self.sender.send(Outbound::Message(message)).is_err() {
            tracing::warn!(
                "Attempted to send on closed socket | User: {} | Connection: {}",
                self.user_id,
                self.connection_id
            );
            return false;
        }
        true
    }

    pub fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }
}

pub struct Room {
    pub quiz_id: String,
    pub leaderboard: Arc<dyn LeaderboardService>,
    pub questions: Arc<dyn QuestionService>,
    clients: RwLock<HashMap<String, ClientHandle>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl Room {
    pub fn new(
        quiz_id: &str,
        leaderboard: Arc<dyn LeaderboardService>,
        questions: Arc<dyn QuestionService>,
    ) -> Self {
        Self {
            quiz_id: quiz_id.to_string(),
            leaderboard,
            questions,
            clients: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a client, replacing any earlier socket of the same participant.
    pub async fn add_client(&self, client: ClientHandle) -> Option<ClientHandle> {
        self.clients
            .write()
            .await
            .insert(client.user_id.clone(), client)
    }

    /// Removes the participant only if the registered socket is `connection_id`.
    pub async fn remove_client(&self, user_id: &str, connection_id: Uuid) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get(user_id) {
            Some(c) if c.connection_id == connection_id => {
                clients.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn client(&self, user_id: &str) -> Option<ClientHandle> {
        self.clients.read().await.get(user_id).cloned()
    }

    /// Snapshot of the local clients; sends happen outside the lock.
    pub async fn clients(&self) -> Vec<ClientHandle> {
        self.clients.read().await.values().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Delivers to every local client. Dead sockets are skipped.
    /// Returns how many clients accepted the frame.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        self.clients()
            .await
            .iter()
            .filter(|c| c.send(message.clone()))
            .count()
    }

    /// Runs `task` for as long as the room lives.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task).abort_handle();
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Closes every local socket and cancels the room's tasks.
    pub(crate) async fn shutdown(&self) {
        let clients: Vec<ClientHandle> = self.clients.write().await.drain().map(|(_, c)| c).collect();
        for client in &clients {
            client.close();
        }

        let tasks: Vec<AbortHandle> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            task.abort();
        }
    }
}
