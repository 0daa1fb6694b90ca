use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use researchflow::agents::{
    MemoryBlockStore, QuotaClient, SearchAgent, SocialSearchAgent, VideoSearchAgent,
};
use researchflow::jobs::model::{Job, SearchRequest};
use researchflow::jobs::retry::BackoffConfig;
use serde_json::{json, Value};

fn quota_client() -> QuotaClient {
    QuotaClient::new(Arc::new(MemoryBlockStore::new()), BackoffConfig::default()).unwrap()
}

fn request(payload: Value) -> SearchRequest {
    SearchRequest::from_job(&Job::new("live-1", payload))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn video_agent_without_query_returns_empty_without_calling_out() {
    let agent = VideoSearchAgent::new(quota_client(), Some("key".into()), false)
        .with_endpoints("http://127.0.0.1:9/search", "http://127.0.0.1:9/videos");

    let records = agent.search(&request(json!({"query": ""}))).await.unwrap();
    assert_eq!(records, json!([]));
}

#[tokio::test]
async fn video_agent_without_key_fails_loudly_when_live() {
    let agent = VideoSearchAgent::new(quota_client(), None, false);
    let err = agent.search(&request(json!({"query": "q"}))).await.unwrap_err();
    assert!(err.to_string().contains("no video API key"));
}

#[tokio::test]
async fn offline_video_agent_returns_canned_records() {
    let agent = VideoSearchAgent::new(quota_client(), None, true);
    let records = agent
        .search(&request(json!({"query": "rust talks", "max_results": 3})))
        .await
        .unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["videoId"], json!("mock-0-rust-talks"));
}

#[tokio::test]
async fn video_agent_pages_and_joins_details_into_records() {
    // page one of search hands out a second page; details answer per batch
    let app = Router::new()
        .route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("key").map(String::as_str), Some("k-1"));
                assert_eq!(params.get("q").map(String::as_str), Some("rust"));
                match params.get("pageToken").map(String::as_str) {
                    None => Json(json!({
                        "nextPageToken": "page-2",
                        "items": [
                            {"id": {"videoId": "v1"},
                             "snippet": {"title": "Rust interview", "description": "a long talk",
                                          "channelTitle": "RustConf", "publishedAt": "2025-03-01T00:00:00Z"}},
                        ]
                    })),
                    Some("page-2") => Json(json!({
                        "items": [
                            {"id": {"videoId": "v2"},
                             "snippet": {"title": "Second", "description": "",
                                          "channelTitle": "RustConf", "publishedAt": "2025-03-02T00:00:00Z"}},
                        ]
                    })),
                    Some(other) => panic!("unexpected page token {other}"),
                }
            }),
        )
        .route(
            "/videos",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let ids = params.get("id").cloned().unwrap_or_default();
                let items: Vec<Value> = ids
                    .split(',')
                    .map(|id| {
                        json!({
                            "id": id,
                            "contentDetails": {"duration": "PT1M30S"},
                            "statistics": {"viewCount": "1000"}
                        })
                    })
                    .collect();
                Json(json!({ "items": items }))
            }),
        );
    let base = serve(app).await;

    let agent = VideoSearchAgent::new(quota_client(), Some("k-1".into()), false)
        .with_endpoints(format!("{base}/search"), format!("{base}/videos"));

    let records = agent
        .search(&request(json!({"query": "rust", "depth_of_search": 2})))
        .await
        .unwrap();
    let records = records.as_array().unwrap();

    assert_eq!(records.len(), 2, "both pages contribute records");
    assert_eq!(records[0]["videoId"], json!("v1"));
    assert_eq!(records[0]["url"], json!("https://www.youtube.com/watch?v=v1"));
    assert_eq!(records[0]["durationSeconds"], json!(90));
    assert_eq!(records[0]["viewCount"], json!(1000));
    // "interview" and "talk" both hit, plus the view contribution
    let score = records[0]["relevanceScore"].as_f64().unwrap();
    assert!(score > 2.0 && score < 3.0, "got {score}");
    assert_eq!(records[1]["videoId"], json!("v2"));
}

#[tokio::test]
async fn video_agent_honors_max_results_across_pages() {
    let app = Router::new()
        .route(
            "/search",
            get(|| async {
                Json(json!({
                    "nextPageToken": "more",
                    "items": [
                        {"id": {"videoId": "a"}, "snippet": {"title": "A", "description": ""}},
                        {"id": {"videoId": "b"}, "snippet": {"title": "B", "description": ""}},
                        {"id": {"videoId": "c"}, "snippet": {"title": "C", "description": ""}},
                    ]
                }))
            }),
        )
        .route(
            "/videos",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let items: Vec<Value> = params
                    .get("id")
                    .cloned()
                    .unwrap_or_default()
                    .split(',')
                    .map(|id| json!({"id": id, "contentDetails": {}, "statistics": {}}))
                    .collect();
                Json(json!({ "items": items }))
            }),
        );
    let base = serve(app).await;

    let agent = VideoSearchAgent::new(quota_client(), Some("k".into()), false)
        .with_endpoints(format!("{base}/search"), format!("{base}/videos"));

    let records = agent
        .search(&request(json!({"query": "q", "max_results": 2, "depth": 5})))
        .await
        .unwrap();
    assert_eq!(records.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn social_agent_without_token_returns_an_empty_list() {
    let agent = SocialSearchAgent::new(quota_client(), None, false);
    let records = agent.search(&request(json!({"query": "q"}))).await.unwrap();
    assert_eq!(records, json!([]));
}

#[tokio::test]
async fn offline_social_agent_returns_the_canned_tweet() {
    let agent = SocialSearchAgent::new(quota_client(), None, true);
    let records = agent.search(&request(json!({"query": "q"}))).await.unwrap();
    assert_eq!(records[0]["id"], json!("12345"));
}

#[tokio::test]
async fn social_agent_joins_expanded_users_into_tweet_records() {
    let app = Router::new().route(
        "/recent",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            // requested window is clamped into the API's 10..=100
            assert_eq!(params.get("max_results").map(String::as_str), Some("10"));
            Json(json!({
                "data": [
                    {"id": "t1", "author_id": "u1", "text": "hello",
                     "created_at": "2025-05-01T10:00:00Z", "lang": "en"},
                    {"id": "t2", "author_id": "u-unknown", "text": "orphan"}
                ],
                "includes": {
                    "users": [
                        {"id": "u1", "username": "ada",
                         "public_metrics": {"like_count": 7, "retweet_count": 3}}
                    ]
                }
            }))
        }),
    );
    let base = serve(app).await;

    let agent = SocialSearchAgent::new(quota_client(), Some("token".into()), false)
        .with_endpoint(format!("{base}/recent"));

    let records = agent
        .search(&request(json!({"query": "rust", "max_results": 2})))
        .await
        .unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0]["id"], json!("t1"));
    assert_eq!(records[0]["url"], json!("https://twitter.com/ada/status/t1"));
    assert_eq!(records[0]["author"], json!("ada"));
    assert_eq!(records[0]["like_count"], json!(7));
    assert_eq!(records[0]["retweet_count"], json!(3));
    assert_eq!(records[0]["reply_count"], json!(0));

    // tweets without an expanded user fall back to the id forms
    assert_eq!(
        records[1]["url"],
        json!("https://twitter.com/i/web/status/t2")
    );
    assert_eq!(records[1]["author"], json!("u-unknown"));
    assert_eq!(records[1]["like_count"], json!(0));
}
