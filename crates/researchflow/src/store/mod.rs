use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Shared task store: a live queue (list), a delayed set (sorted set scored by
/// epoch seconds) and one status slot per job id.
///
/// Members of the delayed set are the verbatim serialized job bytes, so a job
/// re-added with the same bytes overwrites its score instead of duplicating.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Append one serialized job to the tail of the live queue.
    async fn push(&self, queue: &str, raw: &str) -> anyhow::Result<()>;

    /// Pop from the head of the live queue, waiting up to `timeout` for a
    /// member to arrive. `None` means the wait elapsed with nothing queued.
    async fn pop(&self, queue: &str, timeout: Duration) -> anyhow::Result<Option<String>>;

    /// Insert `member` into the delayed set with `score`, overwriting the
    /// score if the member is already present.
    async fn delay_add(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()>;

    /// Remove `member` from the delayed set. Removing an absent member is a
    /// no-op; returns whether anything was removed.
    async fn delay_remove(&self, key: &str, member: &str) -> anyhow::Result<bool>;

    /// Members of the delayed set with score <= `max_score`, ordered by score.
    async fn delayed_due(&self, key: &str, max_score: f64) -> anyhow::Result<Vec<String>>;

    /// Overwrite the status slot for `job_id` with a serialized result.
    async fn set_status(&self, job_id: &str, raw: &str) -> anyhow::Result<()>;

    /// Read the status slot for `job_id`, if one has ever been written.
    async fn get_status(&self, job_id: &str) -> anyhow::Result<Option<String>>;
}

pub fn status_key(job_id: &str) -> String {
    format!("job:{job_id}")
}
