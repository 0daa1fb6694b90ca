use std::sync::Arc;
use std::time::Duration;

use researchflow::agents::FileBlockStore;
use researchflow::api;
use researchflow::config::Config;
use researchflow::jobs::{Dispatcher, RunArchive};
use researchflow::store::RedisStore;
use tracing_subscriber::EnvFilter;

mod backends;
mod shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env()?;

    tracing::info!(
        worker_id = %cfg.worker_id,
        queue = %cfg.queue_key,
        delayed = %cfg.delayed_key,
        pop_timeout_s = cfg.pop_timeout_seconds,
        api = %cfg.api_addr.clone().unwrap_or_else(|| "disabled".to_string()),
        state_dir = %cfg.state_dir.display(),
        runs_dir = %cfg.runs_dir.display(),
        offline = cfg.offline_mode,
        "researchflow worker starting"
    );

    let blocks = Arc::new(FileBlockStore::new(&cfg.state_dir));
    let router = backends::build_router(&cfg, blocks)?;
    let archive = RunArchive::new(&cfg.runs_dir);

    // BLPOP parks its connection, so the dispatch loop and the API each get
    // a store of their own.
    let loop_store = Arc::new(RedisStore::connect(&cfg.redis_url).await?);
    let dispatcher = Dispatcher::new(
        loop_store,
        router,
        archive,
        cfg.queue_key.clone(),
        cfg.delayed_key.clone(),
        Duration::from_secs(cfg.pop_timeout_seconds),
    );

    let token = shutdown::install_shutdown_handler();

    // ---- API task ----
    let api_addr = cfg.api_addr.clone();
    let api_state = match &api_addr {
        Some(_) => Some(api::ApiState {
            store: Arc::new(RedisStore::connect(&cfg.redis_url).await?),
            queue_key: cfg.queue_key.clone(),
        }),
        None => None,
    };
    let api_handle = tokio::spawn(async move {
        if let (Some(addr), Some(state)) = (api_addr, api_state) {
            let app = api::router(state);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "api listening");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Dispatch loop task ----
    let loop_token = token.clone();
    let worker_handle = tokio::spawn(async move { dispatcher.run(loop_token).await });

    tokio::select! {
        res = api_handle => res??,
        res = worker_handle => res??,
    }

    Ok(())
}
