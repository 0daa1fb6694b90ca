use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use researchflow::agents::{AgentError, SearchAgent};
use researchflow::jobs::model::SearchRequest;
use researchflow::jobs::router::{Backend, Router};
use researchflow::jobs::{Dispatcher, RunArchive};
use researchflow::store::MemoryStore;

pub const QUEUE: &str = "tasks";
pub const DELAYED: &str = "delayed_jobs";
pub const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// One scripted outcome per search call.
#[derive(Clone)]
#[allow(dead_code)]
pub enum Reply {
    Records(Value),
    Deferred(Option<f64>),
    Api(String),
}

/// Agent that replays a fixed script, repeating the last outcome once the
/// script runs dry, and counts how often it was called.
pub struct ScriptedAgent {
    name: &'static str,
    script: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedAgent {
    pub fn new(name: &'static str, script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchAgent for ScriptedAgent {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(&self, _request: &SearchRequest) -> Result<Value, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().await;
        let reply = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match reply {
            Some(Reply::Records(records)) => Ok(records),
            Some(Reply::Deferred(retry_after)) => Err(AgentError::deferred(retry_after)),
            Some(Reply::Api(message)) => Err(AgentError::api(Some(404), message)),
            None => Err(AgentError::api(None, "script exhausted")),
        }
    }
}

/// In-memory dispatcher wired to a scratch runs directory.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub dispatcher: Dispatcher,
    pub runs_dir: tempfile::TempDir,
}

#[allow(dead_code)]
pub fn harness_with_router(router: Router) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let runs_dir = tempfile::tempdir().expect("tempdir");
    let dispatcher = Dispatcher::new(
        store.clone(),
        router,
        RunArchive::new(runs_dir.path()),
        QUEUE,
        DELAYED,
        POP_TIMEOUT,
    );
    Harness {
        store,
        dispatcher,
        runs_dir,
    }
}

/// Harness that routes every job to the given agent.
#[allow(dead_code)]
pub fn single_agent_harness(agent: Arc<ScriptedAgent>) -> Harness {
    harness_with_router(Router::new(Backend::new(agent)))
}

#[allow(dead_code)]
pub fn job_json(id: &str, payload: Value) -> Value {
    json!({ "id": id, "payload": payload })
}

#[allow(dead_code)]
pub async fn enqueue_raw(store: &MemoryStore, job: &Value) -> String {
    use researchflow::store::TaskStore;
    let raw = job.to_string();
    store.push(QUEUE, &raw).await.expect("push");
    raw
}

#[allow(dead_code)]
pub async fn status_of(store: &MemoryStore, job_id: &str) -> Option<Value> {
    use researchflow::store::TaskStore;
    store
        .get_status(job_id)
        .await
        .expect("get_status")
        .map(|raw| serde_json::from_str(&raw).expect("status json"))
}
