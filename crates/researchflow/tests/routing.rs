mod common;

use common::{enqueue_raw, job_json, status_of, Reply, ScriptedAgent};
use researchflow::jobs::model::Job;
use researchflow::jobs::router::{Backend, Route, Router};
use serde_json::{json, Value};

fn research_router() -> (Router, std::sync::Arc<ScriptedAgent>) {
    let social = ScriptedAgent::new("social_search", vec![Reply::Records(json!([{"id": "t1"}]))]);
    let video = ScriptedAgent::new("video_search", vec![Reply::Records(json!([{"videoId": "v1"}]))]);
    let fallback = ScriptedAgent::new("text_completion", vec![Reply::Records(json!("echo"))]);

    let mut router = Router::new(Backend::new(fallback));
    router.add(
        Route::new()
            .prompt_id("pr-twitter")
            .agent("social_search")
            .agent("twitter_researcher")
            .tag("twitter"),
        Backend::new(social.clone()),
    );
    router.add(
        Route::new()
            .prompt_id("pr-007")
            .agent("video_search")
            .agent("youtube_researcher")
            .tag("youtube"),
        Backend::new(video),
    );
    (router, social)
}

fn route_name(router: &Router, payload: Value) -> String {
    router.route(&Job::new("x", payload)).name().to_string()
}

#[test]
fn payload_fields_pick_the_backend() {
    let (router, _) = research_router();

    assert_eq!(route_name(&router, json!({"prompt_id": "pr-007"})), "video_search");
    assert_eq!(route_name(&router, json!({"agent": "video_search"})), "video_search");
    assert_eq!(route_name(&router, json!({"agent": "youtube_researcher"})), "video_search");
    assert_eq!(route_name(&router, json!({"tags": ["news", "youtube"]})), "video_search");

    assert_eq!(route_name(&router, json!({"prompt_id": "pr-twitter"})), "social_search");
    assert_eq!(route_name(&router, json!({"agent": "twitter_researcher"})), "social_search");
    // a bare string tag counts as a one-element list
    assert_eq!(route_name(&router, json!({"tags": "twitter"})), "social_search");
    // payload-level id doubles as the prompt id for older producers
    assert_eq!(route_name(&router, json!({"id": "pr-twitter"})), "social_search");
}

#[test]
fn unrouted_payloads_fall_through_to_text_completion() {
    let (router, _) = research_router();

    assert_eq!(route_name(&router, json!({})), "text_completion");
    assert_eq!(route_name(&router, json!({"agent": "unknown"})), "text_completion");
    assert_eq!(route_name(&router, json!({"tags": ["cooking"]})), "text_completion");
    // tags that are not strings or lists are ignored
    assert_eq!(route_name(&router, json!({"tags": 7})), "text_completion");
}

#[test]
fn first_matching_route_wins() {
    let (router, _) = research_router();

    // matches both tables; social is registered first
    let both = json!({"prompt_id": "pr-twitter", "tags": ["youtube"]});
    assert_eq!(route_name(&router, both), "social_search");
}

#[tokio::test]
async fn dispatch_sends_the_job_to_the_routed_backend() {
    let (router, social) = research_router();
    let h = common::harness_with_router(router);

    enqueue_raw(
        &h.store,
        &job_json("route-1", json!({"tags": ["twitter"], "query": "rustlang"})),
    )
    .await;
    h.dispatcher.run_once().await.unwrap();

    assert_eq!(social.calls(), 1);
    let status = status_of(&h.store, "route-1").await.unwrap();
    assert_eq!(status["response"], json!([{"id": "t1"}]));
}
