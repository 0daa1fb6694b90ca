use std::path::PathBuf;

// Config is a central place for runtime configuration.
// It loads values from environment variables and gives you a typed,
// validated struct instead of raw strings everywhere.

#[derive(Clone, Debug)]
pub struct Config {
    pub redis_url: String,
    pub worker_id: String,
    pub queue_key: String,
    pub delayed_key: String,
    pub pop_timeout_seconds: u64,
    pub api_addr: Option<String>,
    pub state_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub model_runner_url: Option<String>,
    pub video_api_key: Option<String>,
    pub video_mcp_url: Option<String>,
    pub social_bearer_token: Option<String>,
    pub social_mcp_url: Option<String>,
    pub offline_mode: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let redis_url = env_or_fallback("RFLOW_REDIS_URL", "REDIS_URL")
            .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        let worker_id = env_or_fallback("RFLOW_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker-1".to_string());

        let queue_key =
            env_or_fallback("RFLOW_QUEUE_KEY", "QUEUE_KEY").unwrap_or_else(|| "tasks".to_string());

        let delayed_key = env_or_fallback("RFLOW_DELAYED_KEY", "DELAYED_KEY")
            .unwrap_or_else(|| "delayed_jobs".to_string());

        let pop_timeout_seconds = env_or_fallback("RFLOW_POP_TIMEOUT_SECONDS", "POP_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let api_addr =
            env_or_fallback("RFLOW_API_ADDR", "API_ADDR").and_then(|s| normalize_optional_addr(&s));

        let state_dir = env_or_fallback("RFLOW_STATE_DIR", "STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_dir);

        let runs_dir = env_or_fallback("RFLOW_RUNS_DIR", "RUNS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("runs/jobs"));

        let model_runner_url =
            env_or_fallback("RFLOW_MODEL_RUNNER_URL", "MODEL_RUNNER_URL").and_then(|s| {
                let s = s.trim().to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            });

        let video_api_key = env_or_fallback("RFLOW_VIDEO_API_KEY", "YOUTUBE_API_KEY");
        let video_mcp_url = env_or_fallback("RFLOW_VIDEO_MCP_URL", "YOUTUBE_MCP_URL");
        let social_bearer_token = env_or_fallback("RFLOW_SOCIAL_BEARER_TOKEN", "TWITTER_BEARER_TOKEN");
        let social_mcp_url = env_or_fallback("RFLOW_SOCIAL_MCP_URL", "TWITTER_MCP_URL");

        let offline_mode = env_bool("RFLOW_OFFLINE_MODE").unwrap_or(false);

        Ok(Self {
            redis_url,
            worker_id,
            queue_key,
            delayed_key,
            pop_timeout_seconds,
            api_addr,
            state_dir,
            runs_dir,
            model_runner_url,
            video_api_key,
            video_mcp_url,
            social_bearer_token,
            social_mcp_url,
            offline_mode,
        })
    }
}

fn default_state_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".researchflow")
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
