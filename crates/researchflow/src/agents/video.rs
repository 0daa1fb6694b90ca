use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{json, Value};

use crate::agents::client::QuotaClient;
use crate::agents::{AgentError, SearchAgent};
use crate::jobs::model::SearchRequest;

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

const PAGE_SIZE: &str = "25";

/// Video research backend against the YouTube Data v3 API.
///
/// Pages through search results up to `depth` pages, batch-fetches content
/// details and statistics for each page, and returns curated records with a
/// relevance score and suggested tags.
pub struct VideoSearchAgent {
    client: QuotaClient,
    api_key: Option<String>,
    offline: bool,
    search_url: String,
    videos_url: String,
}

impl VideoSearchAgent {
    pub fn new(client: QuotaClient, api_key: Option<String>, offline: bool) -> Self {
        Self {
            client,
            api_key,
            offline,
            search_url: SEARCH_URL.to_string(),
            videos_url: VIDEOS_URL.to_string(),
        }
    }

    /// Point the agent at different API endpoints. Tests use this to run the
    /// full paging pipeline against a local server.
    pub fn with_endpoints(mut self, search_url: impl Into<String>, videos_url: impl Into<String>) -> Self {
        self.search_url = search_url.into();
        self.videos_url = videos_url.into();
        self
    }

    async fn live_search(&self, request: &SearchRequest, api_key: &str) -> Result<Value, AgentError> {
        let max_results = request.max_results as usize;
        let mut collected: Vec<Value> = Vec::new();
        let mut next_page_token: Option<String> = None;
        let mut pages = 0u32;

        while pages < request.depth {
            let mut params: Vec<(String, String)> = vec![
                ("part".into(), "snippet".into()),
                ("q".into(), request.query.clone()),
                ("type".into(), "video".into()),
                ("maxResults".into(), PAGE_SIZE.into()),
            ];
            apply_filters(&mut params, request.filters.as_ref());
            if let Some(token) = &next_page_token {
                set_param(&mut params, "pageToken", token.clone());
            }
            set_param(&mut params, "key", api_key.to_string());

            let data = self
                .client
                .get_json(self.name(), &self.search_url, &params, None)
                .await?;
            next_page_token = data
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            pages += 1;

            let items = data
                .get("items")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if items.is_empty() {
                break;
            }

            let video_ids: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("id")?.get("videoId")?.as_str())
                .collect();
            if video_ids.is_empty() {
                continue;
            }

            let detail_params: Vec<(String, String)> = vec![
                ("part".into(), "snippet,contentDetails,statistics".into()),
                ("id".into(), video_ids.join(",")),
                ("key".into(), api_key.to_string()),
            ];
            let detail_data = self
                .client
                .get_json(self.name(), &self.videos_url, &detail_params, None)
                .await?;
            let details: HashMap<&str, &Value> = detail_data
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| Some((v.get("id")?.as_str()?, v)))
                        .collect()
                })
                .unwrap_or_default();

            for item in &items {
                let Some(vid) = item
                    .get("id")
                    .and_then(|id| id.get("videoId"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                let Some(detail) = details.get(vid) else {
                    continue;
                };

                collected.push(build_record(vid, item, detail));
                if collected.len() >= max_results {
                    break;
                }
            }

            if collected.len() >= max_results {
                break;
            }
            if next_page_token.is_none() {
                break;
            }

            // polite pause between pages
            let pause = 0.2 + rand::thread_rng().gen_range(0.0..0.1);
            tokio::time::sleep(Duration::from_secs_f64(pause)).await;
        }

        collected.truncate(max_results);
        Ok(Value::Array(collected))
    }
}

#[async_trait]
impl SearchAgent for VideoSearchAgent {
    fn name(&self) -> &str {
        "video_search"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Value, AgentError> {
        if request.query.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        if self.offline {
            return Ok(Value::Array(canned_records(
                &request.query,
                request.max_results,
            )));
        }
        let Some(api_key) = self.api_key.clone() else {
            return Err(AgentError::api(
                None,
                "no video API key configured for live calls",
            ));
        };

        self.live_search(request, &api_key).await
    }
}

fn build_record(vid: &str, item: &Value, detail: &Value) -> Value {
    let snippet = item.get("snippet").cloned().unwrap_or_default();
    let title = snippet.get("title").and_then(Value::as_str);
    let description = snippet
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let view_count = detail
        .get("statistics")
        .and_then(|s| s.get("viewCount"))
        .map(count_from)
        .unwrap_or(0);
    let duration = detail
        .get("contentDetails")
        .and_then(|c| c.get("duration"))
        .and_then(Value::as_str)
        .map(iso8601_duration_seconds)
        .unwrap_or(0);

    json!({
        "videoId": vid,
        "url": format!("https://www.youtube.com/watch?v={vid}"),
        "title": title,
        "description": description,
        "channelTitle": snippet.get("channelTitle").and_then(Value::as_str),
        "publishedAt": snippet.get("publishedAt").and_then(Value::as_str),
        "durationSeconds": duration,
        // legacy field kept for older consumers
        "duration": duration,
        "viewCount": view_count,
        "relevanceScore": relevance_score(title, Some(&description), view_count),
        "suggestedTags": suggested_tags(title, Some(&description)),
    })
}

/// Deterministic records for offline runs and tests: capped at five, ids
/// derived from the query.
pub fn canned_records(query: &str, max_results: u32) -> Vec<Value> {
    let now_iso = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let slug = slugify(query);
    let first_word = query
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    (0..max_results.min(5))
        .map(|i| {
            let vid = format!("mock-{i}-{slug}");
            json!({
                "videoId": vid,
                "url": format!("https://www.youtube.com/watch?v={vid}"),
                "title": format!("Mock result {} for '{query}'", i + 1),
                "description": format!("This is a mocked description for '{query}', result {}.", i + 1),
                "channelTitle": "Mock Channel",
                "publishedAt": now_iso,
                "durationSeconds": 60 + i * 10,
                "duration": 60 + i * 10,
                "viewCount": 100 + i * 10,
                "relevanceScore": 1.0 + f64::from(i) * 0.1,
                "suggestedTags": ["mock", "test", first_word.as_str()],
            })
        })
        .collect()
}

fn slugify(query: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;
    for ch in query.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.chars().take(20).collect()
}

fn apply_filters(params: &mut Vec<(String, String)>, filters: Option<&Value>) {
    let Some(map) = filters.and_then(Value::as_object) else {
        return;
    };
    for (key, value) in map {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        set_param(params, key, rendered);
    }
}

fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => params.push((key.to_string(), value)),
    }
}

fn count_from(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Seconds from an ISO 8601 duration of the PT#H#M#S shape the API returns.
pub fn iso8601_duration_seconds(duration: &str) -> u64 {
    let Some(rest) = duration.strip_prefix("PT") else {
        return 0;
    };
    let mut total = 0u64;
    let mut digits = String::new();
    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: u64 = digits.parse().unwrap_or(0);
        digits.clear();
        match ch {
            'H' => total += value * 3600,
            'M' => total += value * 60,
            'S' => total += value,
            _ => return total,
        }
    }
    total
}

const RELEVANCE_KEYWORDS: [&str; 6] = [
    "interview",
    "talk",
    "lecture",
    "webinar",
    "presentation",
    "documentary",
];

/// Keyword presence plus a dampened view-count contribution.
pub fn relevance_score(title: Option<&str>, description: Option<&str>, view_count: u64) -> f64 {
    let text = format!(
        "{} {}",
        title.unwrap_or_default(),
        description.unwrap_or_default()
    )
    .to_lowercase();

    let mut score = 0.0;
    for keyword in RELEVANCE_KEYWORDS {
        if text.contains(keyword) {
            score += 1.0;
        }
    }
    score + (view_count as f64).ln_1p() / 10.0
}

/// Top six tokens of the title and description by frequency, first-seen order
/// breaking ties.
pub fn suggested_tags(title: Option<&str>, description: Option<&str>) -> Vec<String> {
    let text = format!(
        "{} {}",
        title.unwrap_or_default(),
        description.unwrap_or_default()
    )
    .to_lowercase();

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for token in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 3)
    {
        let entry = counts.entry(token.to_string()).or_insert(0);
        if *entry == 0 {
            order.push(token.to_string());
        }
        *entry += 1;
    }

    order.sort_by_key(|token| std::cmp::Reverse(counts[token]));
    order.truncate(6);
    order
}
