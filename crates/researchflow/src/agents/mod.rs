use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::jobs::model::SearchRequest;

pub mod block;
pub mod client;
pub mod remote;
pub mod social;
pub mod text;
pub mod video;

pub use block::{BlockState, BlockStore, FileBlockStore, MemoryBlockStore};
pub use client::QuotaClient;
pub use remote::RemoteAgent;
pub use social::SocialSearchAgent;
pub use text::TextCompletionAgent;
pub use video::VideoSearchAgent;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The backend is rate limited. The job is still good; run it again after
    /// the hint (seconds), or after a conservative default if there is none.
    #[error("quota exceeded; retry after {}", retry_hint(.retry_after))]
    Deferred { retry_after: Option<f64> },

    /// The backend answered but the call cannot succeed as issued.
    #[error("{message}")]
    Api {
        status: Option<u16>,
        message: String,
    },
}

impl AgentError {
    pub fn deferred(retry_after: Option<f64>) -> Self {
        Self::Deferred { retry_after }
    }

    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

fn retry_hint(retry_after: &Option<f64>) -> String {
    match retry_after {
        Some(secs) => format!("{secs}s"),
        None => "an unspecified delay".to_string(),
    }
}

/// A research backend: takes an extracted search request, returns the JSON
/// response body for the job result (a record list for the research agents,
/// a string for text completion).
#[async_trait]
pub trait SearchAgent: Send + Sync {
    /// Stable backend name, used for routing, logs and block-state files.
    fn name(&self) -> &str;

    async fn search(&self, request: &SearchRequest) -> Result<Value, AgentError>;
}
