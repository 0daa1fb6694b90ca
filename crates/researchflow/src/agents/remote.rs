use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::{AgentError, SearchAgent};
use crate::jobs::model::SearchRequest;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs a backend as a remote service, with the in-process agent as the
/// fallback when the service cannot be reached at all.
///
/// `POST <base>/call` with the search request. 200 carries the record list,
/// 429 becomes a deferral built from the `Retry-After` header, any other
/// status is a terminal API error. Only transport failures fall back: a
/// deferral or an error from the remote is returned as-is, never retried
/// against the local agent.
pub struct RemoteAgent {
    inner: Arc<dyn SearchAgent>,
    base_url: String,
    http: reqwest::Client,
}

impl RemoteAgent {
    pub fn new(inner: Arc<dyn SearchAgent>, base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(CALL_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            inner,
            base_url,
            http,
        })
    }
}

#[async_trait]
impl SearchAgent for RemoteAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, request: &SearchRequest) -> Result<Value, AgentError> {
        let url = format!("{}/call", self.base_url);
        let body = json!({
            "id": request.id,
            "query": request.query,
            "max_results": request.max_results,
            "depth": request.depth,
            "filters": request.filters,
        });

        let resp = match self.http.post(&url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(backend = self.name(), error = %e, "remote call failed, using in-process agent");
                return self.inner.search(request).await;
            }
        };

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|raw| raw.trim().parse::<f64>().ok());
            return Err(AgentError::deferred(retry_after));
        }
        if status != 200 {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::api(
                Some(status),
                format!("remote backend error {status}: {text}"),
            ));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|_| AgentError::api(Some(status), "invalid JSON from remote backend"))?;
        Ok(data
            .get("response")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }
}
