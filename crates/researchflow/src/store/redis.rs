// crates/researchflow/src/store/redis.rs

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::store::{status_key, TaskStore};

/// Redis-backed [`TaskStore`].
///
/// `pop` issues BLPOP, which parks its connection for the whole wait. Build a
/// separate `RedisStore` for each component that pops (the dispatch loop) so
/// the API's reads never queue behind a blocked connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn push(&self, queue: &str, raw: &str) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.rpush(queue, raw).await?;
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> anyhow::Result<Option<String>> {
        let mut conn = self.manager.clone();
        // BLPOP replies nil on timeout, otherwise [key, member].
        let popped: Option<(String, String)> = conn.blpop(queue, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, member)| member))
    }

    async fn delay_add(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn delay_remove(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn delayed_due(&self, key: &str, max_score: f64) -> anyhow::Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn.zrangebyscore(key, 0f64, max_score).await?;
        Ok(members)
    }

    async fn set_status(&self, job_id: &str, raw: &str) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(status_key(job_id), raw).await?;
        Ok(())
    }

    async fn get_status(&self, job_id: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(status_key(job_id)).await?;
        Ok(raw)
    }
}
