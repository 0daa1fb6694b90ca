use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;

use crate::agents::block::BlockStore;
use crate::agents::AgentError;
use crate::jobs::epoch_seconds;
use crate::jobs::retry::{base_delay_seconds, classify_status, next_delay, BackoffConfig, ErrorClass};

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP GET wrapper shared by the research backends.
///
/// Checks the persisted block before issuing anything, retries transport and
/// 5xx failures with capped exponential backoff, and turns 429 into
/// [`AgentError::Deferred`] after persisting a `blocked_until` for the
/// backend so sibling workers stop hammering the same API.
#[derive(Clone)]
pub struct QuotaClient {
    http: reqwest::Client,
    blocks: Arc<dyn BlockStore>,
    cfg: BackoffConfig,
}

impl QuotaClient {
    pub fn new(blocks: Arc<dyn BlockStore>, cfg: BackoffConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { http, blocks, cfg })
    }

    pub async fn get_json(
        &self,
        backend: &str,
        url: &str,
        params: &[(String, String)],
        bearer: Option<&str>,
    ) -> Result<Value, AgentError> {
        let now = epoch_seconds();
        if let Some(blocked_until) = self.blocks.blocked_until(backend).await {
            if now < blocked_until {
                return Err(AgentError::deferred(Some(blocked_until - now)));
            }
        }

        let mut rng = StdRng::from_entropy();

        for attempt in 1..=self.cfg.max_attempts {
            let mut request = self.http.get(url).query(params);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            let resp = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt == self.cfg.max_attempts {
                        return Err(AgentError::api(None, e.to_string()));
                    }
                    tokio::time::sleep(next_delay(attempt, &self.cfg, &mut rng)).await;
                    continue;
                }
            };

            let status = resp.status().as_u16();

            if status == 429 {
                return Err(self.on_rate_limited(backend, attempt, &resp).await);
            }

            if classify_status(status) == ErrorClass::Retryable {
                if attempt == self.cfg.max_attempts {
                    return Err(AgentError::api(
                        Some(status),
                        format!("HTTP {status} from {url}"),
                    ));
                }
                tokio::time::sleep(next_delay(attempt, &self.cfg, &mut rng)).await;
                continue;
            }

            if status >= 400 {
                let body = resp.text().await.unwrap_or_default();
                return Err(AgentError::api(
                    Some(status),
                    format!("HTTP {status} from {url}: {body}"),
                ));
            }

            return match resp.json::<Value>().await {
                Ok(value) => Ok(value),
                Err(_) => Err(AgentError::api(Some(status), "Invalid JSON from API")),
            };
        }

        Err(AgentError::api(None, "Exceeded retry attempts"))
    }

    async fn on_rate_limited(
        &self,
        backend: &str,
        attempt: u32,
        resp: &reqwest::Response,
    ) -> AgentError {
        let now = epoch_seconds();
        let hint = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| parse_retry_after(raw, now));

        // No usable hint: block for the current backoff window, at least a minute.
        let block_seconds = match hint {
            Some(secs) if secs > 0.0 => secs,
            _ => base_delay_seconds(attempt, &self.cfg).max(60.0),
        };

        let blocked_until = now + block_seconds;
        if let Err(e) = self.blocks.set_blocked_until(backend, blocked_until).await {
            // best effort: losing the shared state must not lose the deferral
            tracing::warn!(backend, error = %e, "failed to persist block state");
        }
        tracing::info!(backend, block_seconds, "rate limited, deferring");

        AgentError::deferred(Some(block_seconds))
    }
}

/// Parse a Retry-After header value against `now` (epoch seconds): plain
/// seconds first, then an HTTP-date, whose delta may be zero or negative.
pub fn parse_retry_after(raw: &str, now: f64) -> Option<f64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        return Some(secs);
    }
    chrono::DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|when| when.timestamp() as f64 - now)
}
