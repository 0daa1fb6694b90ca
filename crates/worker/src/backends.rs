use std::sync::Arc;

use researchflow::agents::{
    BlockStore, QuotaClient, RemoteAgent, SearchAgent, SocialSearchAgent, TextCompletionAgent,
    VideoSearchAgent,
};
use researchflow::config::Config;
use researchflow::jobs::retry::BackoffConfig;
use researchflow::jobs::router::{Backend, Route, Router, UrlHint};

/// Build the routing table the dispatch loop consults. Routes are evaluated
/// in order, social before video; jobs no route claims fall through to text
/// completion.
pub fn build_router(cfg: &Config, blocks: Arc<dyn BlockStore>) -> anyhow::Result<Router> {
    let client = QuotaClient::new(blocks, BackoffConfig::default())?;

    let social = wrap_remote(
        Arc::new(SocialSearchAgent::new(
            client.clone(),
            cfg.social_bearer_token.clone(),
            cfg.offline_mode,
        )),
        cfg.social_mcp_url.as_deref(),
    )?;

    let video = wrap_remote(
        Arc::new(VideoSearchAgent::new(
            client,
            cfg.video_api_key.clone(),
            cfg.offline_mode,
        )),
        cfg.video_mcp_url.as_deref(),
    )?;

    let fallback = Backend::new(Arc::new(TextCompletionAgent::new(
        cfg.model_runner_url.clone(),
    )?));

    let mut router = Router::new(fallback);
    router.add(
        Route::new()
            .prompt_id("pr-twitter")
            .agent("social_search")
            .agent("twitter_researcher")
            .tag("twitter"),
        Backend::new(social)
            .with_url_hint(UrlHint::new("id", "https://twitter.com/i/web/status/{id}")),
    );
    router.add(
        Route::new()
            .prompt_id("pr-007")
            .agent("video_search")
            .agent("youtube_researcher")
            .tag("youtube"),
        Backend::new(video).with_url_hint(UrlHint::new(
            "videoId",
            "https://www.youtube.com/watch?v={id}",
        )),
    );
    Ok(router)
}

/// Run the agent through its remote service when one is configured; the
/// in-process agent stays as the transport-failure fallback.
fn wrap_remote(
    agent: Arc<dyn SearchAgent>,
    mcp_url: Option<&str>,
) -> anyhow::Result<Arc<dyn SearchAgent>> {
    match mcp_url {
        Some(url) => Ok(Arc::new(RemoteAgent::new(agent, url)?)),
        None => Ok(agent),
    }
}
