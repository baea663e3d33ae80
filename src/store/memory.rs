// src/store/memory.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, channel::mpsc};
use tokio::{sync::Mutex, time::Instant};

use super::{MessageStream, Store, StoreMessage, keys};
use crate::error::AppError;

/// In-process store with Redis semantics for the subset the engine uses,
/// including TTLs and expired-key notifications. Used by tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<StoreMessage>>>,
    next_generation: u64,
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    /// Bumped whenever the expiry changes so stale timers do nothing.
    generation: u64,
}

enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    ZSet(HashMap<String, f64>),
}

fn wrong_type(key: &str) -> AppError {
    AppError::InternalServerError(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
    ))
}

impl Inner {
    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn notify(&mut self, channel: &str, payload: &str) {
        if let Some(senders) = self.subscribers.get_mut(channel) {
            senders.retain(|tx| {
                tx.unbounded_send(StoreMessage {
                    channel: channel.to_string(),
                    payload: payload.to_string(),
                })
                .is_ok()
            });
        }
    }

    /// Drops the key if its deadline passed, emitting the expiry event.
    fn purge(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());

        if expired {
            self.entries.remove(key);
            let channel = keys::expiry_channel(0);
            self.notify(&channel, key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        self.purge(key);
        self.entries.get_mut(key)
    }

    fn put(&mut self, key: &str, value: Value, expires_at: Option<Instant>) -> u64 {
        let generation = self.generation();
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                generation,
            },
        );
        generation
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, String>, AppError> {
        if self.live(key).is_none() {
            self.put(key, Value::Hash(HashMap::new()), None);
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Hash(h)) => Ok(h),
            _ => Err(wrong_type(key)),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut HashSet<String>, AppError> {
        if self.live(key).is_none() {
            self.put(key, Value::Set(HashSet::new()), None);
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Set(s)) => Ok(s),
            _ => Err(wrong_type(key)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut HashMap<String, f64>, AppError> {
        if self.live(key).is_none() {
            self.put(key, Value::ZSet(HashMap::new()), None);
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::ZSet(z)) => Ok(z),
            _ => Err(wrong_type(key)),
        }
    }

    /// Members ordered by score descending; equal scores in reverse lexicographic order.
    fn zset_desc(&mut self, key: &str) -> Result<Vec<(String, f64)>, AppError> {
        let Some(entry) = self.live(key) else {
            return Ok(Vec::new());
        };
        let Value::ZSet(z) = &entry.value else {
            return Err(wrong_type(key));
        };

        let mut rows: Vec<(String, f64)> = z.iter().map(|(m, s)| (m.clone(), *s)).collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        Ok(rows)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn schedule_expiry(&self, key: &str, generation: u64, at: Instant) {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();

        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            let mut inner = inner.lock().await;
            let current = inner.entries.get(&key).map(|e| e.generation);
            if current == Some(generation) {
                inner.entries.remove(&key);
                let channel = keys::expiry_channel(0);
                inner.notify(&channel, &key);
            }
        });
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut inner = self.inner.lock().await;
        match inner.live(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        inner.put(key, Value::Str(value.to_string()), None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        let at = Instant::now() + Duration::from_secs(ttl_secs);
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.put(key, Value::Str(value.to_string()), Some(at))
        };
        self.schedule_expiry(key, generation, at);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        if inner.live(key).is_some() {
            return Ok(false);
        }
        inner.put(key, Value::Str(value.to_string()), None);
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, AppError> {
        let mut inner = self.inner.lock().await;
        let remaining = inner
            .live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()));

        // Redis rounds to the nearest second.
        Ok(remaining.map(|d| ((d.as_millis() + 500) / 1000) as u64))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), AppError> {
        let at = Instant::now() + Duration::from_secs(ttl_secs);
        let generation = {
            let mut inner = self.inner.lock().await;
            let generation = inner.generation();
            match inner.live(key) {
                Some(entry) => {
                    entry.expires_at = Some(at);
                    entry.generation = generation;
                }
                None => return Ok(()),
            }
            generation
        };
        self.schedule_expiry(key, generation, at);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.live(key).is_some() && inner.entries.remove(key).is_some())
    }

    async fn claim(&self, token_key: &str, unless_key: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        if inner.live(unless_key).is_some() {
            return Ok(false);
        }
        Ok(inner.live(token_key).is_some() && inner.entries.remove(token_key).is_some())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        inner
            .hash_mut(key)?
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>, AppError> {
        let mut inner = self.inner.lock().await;
        match inner.live(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Hash(h)) => Ok(h.values().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.set_mut(key)?.insert(member.to_string()))
    }

    async fn zadd_nx(&self, key: &str, member: &str, score: f64) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        let zset = inner.zset_mut(key)?;
        if zset.contains_key(member) {
            return Ok(false);
        }
        zset.insert(member.to_string(), score);
        Ok(true)
    }

    async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64, AppError> {
        let mut inner = self.inner.lock().await;
        let score = inner.zset_mut(key)?.entry(member.to_string()).or_insert(0.0);
        *score += delta;
        Ok(*score)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, AppError> {
        let mut inner = self.inner.lock().await;
        match inner.live(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::ZSet(z)) => Ok(z.get(member).copied()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zrevrank(&self, key: &str, member: &str) -> Result<Option<usize>, AppError> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .zset_desc(key)?
            .iter()
            .position(|(m, _)| m == member))
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>, AppError> {
        let mut inner = self.inner.lock().await;
        let rows = inner.zset_desc(key)?;
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(rows.into_iter().skip(start).take(stop - start + 1).collect())
    }

    async fn zcard(&self, key: &str) -> Result<usize, AppError> {
        let mut inner = self.inner.lock().await;
        match inner.live(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::ZSet(z)) => Ok(z.len()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        if inner.live(key).is_none() {
            return Ok(false);
        }
        let zset = inner.zset_mut(key)?;
        let removed = zset.remove(member).is_some();
        if zset.is_empty() {
            inner.entries.remove(key);
        }
        Ok(removed)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        inner.notify(channel, payload);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, AppError> {
        let (tx, rx) = mpsc::unbounded();
        let mut inner = self.inner.lock().await;
        for channel in channels {
            inner
                .subscribers
                .entry(channel.clone())
                .or_default()
                .push(tx.clone());
        }
        Ok(rx.boxed())
    }

    fn expiry_channel(&self) -> String {
        keys::expiry_channel(0)
    }
}
