use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::{AgentError, SearchAgent};
use crate::jobs::model::SearchRequest;

const RUNNER_TIMEOUT: Duration = Duration::from_secs(30);

/// Generic text-completion backend for jobs no research route claims. Posts
/// the prompt to a model-runner service and degrades to a local echo when the
/// runner is unset or unreachable, so fallback jobs always finish.
pub struct TextCompletionAgent {
    http: reqwest::Client,
    runner_url: Option<String>,
}

impl TextCompletionAgent {
    pub fn new(runner_url: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(RUNNER_TIMEOUT).build()?;
        Ok(Self { http, runner_url })
    }

    async fn generate(&self, url: &str, prompt: &str) -> Option<Value> {
        let resp = self
            .http
            .post(url)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        let data: Value = resp.json().await.ok()?;
        let text = completion_text(&data);
        Some(Value::String(text))
    }
}

/// Runner bodies name the completion `response` or `result` depending on the
/// version; anything else is returned whole.
fn completion_text(data: &Value) -> String {
    data.get("response")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            data.get("result")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

#[async_trait]
impl SearchAgent for TextCompletionAgent {
    fn name(&self) -> &str {
        "text_completion"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Value, AgentError> {
        if let Some(url) = &self.runner_url {
            if let Some(response) = self.generate(url, &request.query).await {
                return Ok(response);
            }
            tracing::warn!("model runner call failed, echoing locally");
        }
        Ok(Value::String(format!(
            "(fallback-mock) Echo: {}",
            request.query
        )))
    }
}
