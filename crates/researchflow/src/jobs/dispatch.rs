use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agents::AgentError;
use crate::jobs::epoch_seconds;
use crate::jobs::model::{Job, JobResult, SearchRequest};
use crate::jobs::persist::RunArchive;
use crate::jobs::router::Router;
use crate::store::TaskStore;

/// Delay applied when a deferral carries no usable hint, and the floor for
/// zero or negative hints.
const DEFAULT_RETRY_SECONDS: f64 = 60.0;

/// Outcome of one dispatch iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RanJob {
    /// The pop wait elapsed with nothing queued.
    Idle,
    /// One job was popped and handled: completed, deferred or errored.
    Worked,
}

/// The worker's core loop over a shared [`TaskStore`]: requeue due delayed
/// jobs, pop one live job, route it to a backend, record the outcome.
pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    router: Router,
    archive: RunArchive,
    queue_key: String,
    delayed_key: String,
    pop_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        router: Router,
        archive: RunArchive,
        queue_key: impl Into<String>,
        delayed_key: impl Into<String>,
        pop_timeout: Duration,
    ) -> Self {
        Self {
            store,
            router,
            archive,
            queue_key: queue_key.into(),
            delayed_key: delayed_key.into(),
            pop_timeout,
        }
    }

    /// Run iterations until `shutdown` fires. Cancellation is observed
    /// between iterations, so an in-flight job always finishes; the bounded
    /// pop keeps the wait short. Store failures are logged and retried after
    /// a pause, they do not stop the loop.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(queue = %self.queue_key, "dispatch loop started, waiting for jobs");
        loop {
            if shutdown.is_cancelled() {
                tracing::info!("dispatch loop stopping");
                return Ok(());
            }
            if let Err(e) = self.run_once().await {
                tracing::warn!(error = %e, "dispatch iteration failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// One dispatch iteration: requeue due delayed jobs, then pop and handle
    /// at most one live job.
    pub async fn run_once(&self) -> anyhow::Result<RanJob> {
        self.requeue_due().await;

        let Some(raw) = self.store.pop(&self.queue_key, self.pop_timeout).await? else {
            return Ok(RanJob::Idle);
        };

        let job: Job = match serde_json::from_str(&raw) {
            Ok(job) => job,
            Err(e) => {
                // no id to record a result under; drop the member
                tracing::warn!(error = %e, "discarding unparseable queue member");
                return Ok(RanJob::Worked);
            }
        };

        tracing::info!(job_id = %job.id, "processing job");

        let backend = self.router.route(&job);
        let request = SearchRequest::from_job(&job);
        match backend.agent().search(&request).await {
            Ok(response) => {
                let result = JobResult::success(&job.id, response);
                self.store
                    .set_status(&job.id, &serde_json::to_string(&result)?)
                    .await?;
                tracing::info!(job_id = %job.id, backend = backend.name(), "job completed");
                self.archive.archive(&result, backend.url_hint()).await;
            }
            Err(AgentError::Deferred { retry_after }) => {
                self.defer(&job, &raw, retry_after).await?;
            }
            Err(e) => {
                let result = JobResult::error(&job.id, e.to_string());
                self.store
                    .set_status(&job.id, &serde_json::to_string(&result)?)
                    .await?;
                tracing::warn!(job_id = %job.id, backend = backend.name(), error = %e, "job failed");
            }
        }

        Ok(RanJob::Worked)
    }

    /// Move every delayed job whose ready time has passed back onto the live
    /// queue. Failures are skipped per member so one bad member cannot hold
    /// the rest back, and a store hiccup here never fails the iteration.
    ///
    /// The remove is the commit point: a member is pushed only when this
    /// worker's remove took effect, so workers racing over the same member
    /// requeue it once. A crash between remove and push drops that copy.
    async fn requeue_due(&self) {
        let now = epoch_seconds();
        let due = match self.store.delayed_due(&self.delayed_key, now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "delayed-set range failed, skipping requeue");
                return;
            }
        };

        for member in due {
            let requeued = async {
                if self.store.delay_remove(&self.delayed_key, &member).await? {
                    self.store.push(&self.queue_key, &member).await?;
                }
                anyhow::Ok(())
            }
            .await;
            if let Err(e) = requeued {
                tracing::warn!(error = %e, "failed to requeue delayed job, skipping");
            }
        }
    }

    /// Schedule a deferred job: the original raw bytes go back into the
    /// delayed set and the status slot records the deferral. If scheduling
    /// itself fails the job degrades to an error result rather than vanish
    /// with no trace.
    async fn defer(&self, job: &Job, raw: &str, retry_after: Option<f64>) -> anyhow::Result<()> {
        let retry_after = match retry_after {
            Some(secs) if secs > 0.0 => secs,
            _ => DEFAULT_RETRY_SECONDS,
        };
        let retry_at = epoch_seconds() + retry_after;

        let scheduled = async {
            self.store.delay_add(&self.delayed_key, raw, retry_at).await?;
            let marker = JobResult::deferred(&job.id, retry_after, retry_at);
            self.store
                .set_status(&job.id, &serde_json::to_string(&marker)?)
                .await?;
            anyhow::Ok(())
        }
        .await;

        match scheduled {
            Ok(()) => {
                tracing::info!(job_id = %job.id, retry_after, "job deferred");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "failed to schedule deferred job");
                let result = JobResult::error(
                    &job.id,
                    format!("quota exceeded; retry after {retry_after}s"),
                );
                self.store
                    .set_status(&job.id, &serde_json::to_string(&result)?)
                    .await?;
                Ok(())
            }
        }
    }
}
