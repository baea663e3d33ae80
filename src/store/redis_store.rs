// src/store/redis_store.rs

use async_trait::async_trait;
use futures::StreamExt;
use ::redis::{AsyncCommands, Client, Script, aio::ConnectionManager};

use super::{MessageStream, Store, StoreMessage, keys};
use crate::error::AppError;

const CLAIM_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 1 then
    return 0
end
return redis.call('DEL', KEYS[1])
"#;

/// Redis-backed store. Commands go through a shared auto-reconnecting
/// connection; every subscription gets its own pub/sub connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    db: i64,
    claim: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = Client::open(url)?;
        let db = client.get_connection_info().redis.db;
        let conn = ConnectionManager::new(client.clone()).await?;

        Ok(Self {
            client,
            conn,
            db,
            claim: Script::new(CLAIM_SCRIPT),
        })
    }

    /// Question rotation depends on expired-key events for string keys.
    pub async fn enable_expiry_notifications(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.set_nx(key, value).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, AppError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(key).await?;
        // -2: missing, -1: no expiry
        Ok((ttl >= 0).then_some(ttl as u64))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn claim(&self, token_key: &str, unless_key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .claim
            .key(token_key)
            .key(unless_key)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.hvals(key).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let added: usize = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn zadd_nx(&self, key: &str, member: &str, score: f64) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let added: usize = ::redis::cmd("ZADD")
            .arg(key)
            .arg("NX")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(added > 0)
    }

    async fn zincrby(&self, key: &str, member: &str, delta: f64) -> Result<f64, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.zincr(key, member, delta).await?)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.zscore(key, member).await?)
    }

    async fn zrevrank(&self, key: &str, member: &str) -> Result<Option<usize>, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.zrevrank(key, member).await?)
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>, AppError> {
        let Ok(start) = isize::try_from(start) else {
            return Ok(Vec::new());
        };
        // negative stops count from the tail
        let stop = isize::try_from(stop).unwrap_or(isize::MAX);
        let mut conn = self.conn.clone();
        Ok(conn.zrevrange_withscores(key, start, stop).await?)
    }

    async fn zcard(&self, key: &str) -> Result<usize, AppError> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(key).await?)
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<MessageStream, AppError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel.as_str()).await?;
        }

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let channel = msg.get_channel_name().to_string();
            let message = match msg.get_payload::<String>() {
                Ok(payload) => Some(StoreMessage { channel, payload }),
                Err(e) => {
                    tracing::warn!("Dropping undecodable message on {}: {}", channel, e);
                    None
                }
            };
            futures::future::ready(message)
        });

        Ok(stream.boxed())
    }

    fn expiry_channel(&self) -> String {
        keys::expiry_channel(self.db)
    }
}
