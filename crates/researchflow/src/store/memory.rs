use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::store::TaskStore;

/// In-memory [`TaskStore`] with the same blocking-pop and sorted-set semantics
/// as the Redis one. Used by tests and by local runs without a Redis.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    arrival: Arc<Notify>,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<String>>,
    delayed: HashMap<String, Vec<(String, f64)>>,
    statuses: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn push(&self, queue: &str, raw: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(raw.to_string());
        drop(inner);
        self.arrival.notify_one();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> anyhow::Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for a wakeup before checking, so a push between the
            // check and the wait is not missed.
            let notified = self.arrival.notified();

            {
                let mut inner = self.inner.lock().await;
                if let Some(member) = inner.queues.get_mut(queue).and_then(|q| q.pop_front()) {
                    return Ok(Some(member));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn delay_add(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let set = inner.delayed.entry(key.to_string()).or_default();
        match set.iter_mut().find(|(m, _)| m == member) {
            Some(entry) => entry.1 = score,
            None => set.push((member.to_string(), score)),
        }
        Ok(())
    }

    async fn delay_remove(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(set) = inner.delayed.get_mut(key) else {
            return Ok(false);
        };
        let before = set.len();
        set.retain(|(m, _)| m != member);
        Ok(set.len() < before)
    }

    async fn delayed_due(&self, key: &str, max_score: f64) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let Some(set) = inner.delayed.get(key) else {
            return Ok(Vec::new());
        };
        let mut due: Vec<(String, f64)> = set
            .iter()
            .filter(|(_, score)| *score >= 0.0 && *score <= max_score)
            .cloned()
            .collect();
        // score order, member order on ties, same as ZRANGEBYSCORE
        due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(due.into_iter().map(|(m, _)| m).collect())
    }

    async fn set_status(&self, job_id: &str, raw: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        inner.statuses.insert(job_id.to_string(), raw.to_string());
        Ok(())
    }

    async fn get_status(&self, job_id: &str) -> anyhow::Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.statuses.get(job_id).cloned())
    }
}
