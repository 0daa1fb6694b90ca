use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::agents::client::QuotaClient;
use crate::agents::{AgentError, SearchAgent};
use crate::jobs::model::SearchRequest;

const RECENT_SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";

/// Social research backend against the X API v2 recent search.
///
/// Without a bearer token it returns an empty record list instead of failing,
/// so producers can enqueue social jobs before credentials are provisioned.
pub struct SocialSearchAgent {
    client: QuotaClient,
    bearer_token: Option<String>,
    offline: bool,
    search_url: String,
}

impl SocialSearchAgent {
    pub fn new(client: QuotaClient, bearer_token: Option<String>, offline: bool) -> Self {
        Self {
            client,
            bearer_token,
            offline,
            search_url: RECENT_SEARCH_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, search_url: impl Into<String>) -> Self {
        self.search_url = search_url.into();
        self
    }
}

#[async_trait]
impl SearchAgent for SocialSearchAgent {
    fn name(&self) -> &str {
        "social_search"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Value, AgentError> {
        if self.offline {
            return Ok(Value::Array(canned_records()));
        }
        let Some(bearer) = self.bearer_token.as_deref() else {
            return Ok(Value::Array(Vec::new()));
        };

        // recent search accepts 10..=100 results per request
        let max_results = request.max_results.clamp(10, 100);
        let params: Vec<(String, String)> = vec![
            ("query".into(), request.query.clone()),
            ("max_results".into(), max_results.to_string()),
            (
                "tweet.fields".into(),
                "public_metrics,created_at,lang,author_id".into(),
            ),
            ("expansions".into(), "author_id".into()),
            ("user.fields".into(), "username,name,public_metrics".into()),
        ];

        let data = self
            .client
            .get_json(self.name(), &self.search_url, &params, Some(bearer))
            .await?;

        Ok(Value::Array(map_tweets(&data)))
    }
}

/// Flatten the v2 response (tweets plus expanded users) into the record shape
/// downstream consumers expect.
fn map_tweets(data: &Value) -> Vec<Value> {
    let empty = Map::new();
    let users: std::collections::HashMap<String, &Value> = data
        .get("includes")
        .and_then(|inc| inc.get("users"))
        .and_then(Value::as_array)
        .map(|users| {
            users
                .iter()
                .filter_map(|u| Some((field_string(u, "id")?, u)))
                .collect()
        })
        .unwrap_or_default();

    let tweets = data.get("data").and_then(Value::as_array);
    let Some(tweets) = tweets else {
        return Vec::new();
    };

    tweets
        .iter()
        .map(|tweet| {
            let tid = field_string(tweet, "id").unwrap_or_default();
            let author_id = field_string(tweet, "author_id").unwrap_or_default();
            let user = users.get(&author_id).copied();
            let username = user.and_then(|u| u.get("username")).and_then(Value::as_str);
            let metrics = user
                .and_then(|u| u.get("public_metrics"))
                .and_then(Value::as_object)
                .unwrap_or(&empty);

            let url = match username {
                Some(name) => format!("https://twitter.com/{name}/status/{tid}"),
                None => format!("https://twitter.com/i/web/status/{tid}"),
            };

            json!({
                "id": tid,
                "url": url,
                "text": tweet.get("text").and_then(Value::as_str).unwrap_or_default(),
                "author": username.map(str::to_string).unwrap_or(author_id),
                "created_at": tweet.get("created_at").and_then(Value::as_str).unwrap_or_default(),
                "like_count": metric(metrics, "like_count", "likes"),
                "retweet_count": metric(metrics, "retweet_count", "retweets"),
                "reply_count": metric(metrics, "reply_count", "replies"),
                "lang": tweet.get("lang").and_then(Value::as_str).unwrap_or_default(),
            })
        })
        .collect()
}

fn field_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn metric(metrics: &Map<String, Value>, name: &str, legacy: &str) -> u64 {
    metrics
        .get(name)
        .or_else(|| metrics.get(legacy))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

pub fn canned_records() -> Vec<Value> {
    vec![json!({
        "id": "12345",
        "url": "https://twitter.com/example/status/12345",
        "text": "This is a test tweet",
        "author": "example",
        "created_at": "2025-01-01T00:00:00Z",
        "like_count": 10,
        "retweet_count": 2,
        "reply_count": 1,
        "lang": "en",
    })]
}
