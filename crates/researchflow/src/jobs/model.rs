use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub payload: Value,
}

impl Job {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    fn field(&self, key: &str) -> Option<&Value> {
        self.payload.as_object().and_then(|map| map.get(key))
    }

    pub fn prompt(&self) -> String {
        self.field("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Prompt id used for routing. Falls back to a payload-level `id` field,
    /// which some producers use instead of `prompt_id`.
    pub fn prompt_id(&self) -> String {
        self.field("prompt_id")
            .or_else(|| self.field("id"))
            .map(value_to_string)
            .unwrap_or_default()
    }

    pub fn agent(&self) -> String {
        self.field("agent").map(value_to_string).unwrap_or_default()
    }

    /// Payload tags, normalized: a bare string counts as a one-element list,
    /// anything that is not a string or a list counts as empty.
    pub fn tags(&self) -> Vec<String> {
        match self.field("tags") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            _ => Vec::new(),
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Search parameters extracted from a job payload with the producers'
/// historical aliases and lenient numeric coercion applied.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub id: String,
    pub query: String,
    pub max_results: u32,
    pub depth: u32,
    pub filters: Option<Value>,
}

impl SearchRequest {
    pub fn from_job(job: &Job) -> Self {
        let query = job
            .field("topic_or_person")
            .or_else(|| job.field("query"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| job.prompt());

        let max_results = coerce_count(job.field("max_results"), 25);
        // depth_of_search is the documented name, depth the common shorthand
        let depth = coerce_count(job.field("depth_of_search").or_else(|| job.field("depth")), 1);
        let filters = job.field("filters").filter(|v| !v.is_null()).cloned();

        Self {
            id: job.id.clone(),
            query,
            max_results,
            depth,
            filters,
        }
    }
}

fn coerce_count(value: Option<&Value>, default: u32) -> u32 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n >= 0 => n as u32,
        Some(_) => 0,
        None => default,
    }
}

/// Status-slot value for a job. Exactly one of `response` / `error` is set on
/// a finished result; deferred results carry neither, only the retry hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<f64>,
}

impl JobResult {
    pub fn success(id: &str, response: Value) -> Self {
        Self {
            id: id.to_string(),
            response: Some(response),
            error: None,
            finished_at: Some(Utc::now()),
            deferred: None,
            retry_after: None,
            scheduled_at: None,
        }
    }

    pub fn error(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            response: None,
            error: Some(message.into()),
            finished_at: Some(Utc::now()),
            deferred: None,
            retry_after: None,
            scheduled_at: None,
        }
    }

    pub fn deferred(id: &str, retry_after: f64, scheduled_at: f64) -> Self {
        Self {
            id: id.to_string(),
            response: None,
            error: None,
            finished_at: None,
            deferred: Some(true),
            retry_after: Some(retry_after),
            scheduled_at: Some(scheduled_at),
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred.unwrap_or(false)
    }
}
