use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;

use crate::jobs::model::JobResult;
use crate::jobs::router::UrlHint;

/// Durable copies of successful results under the runs directory: a mutable
/// `last_job_<id>.json` that always holds the latest outcome for the id, plus
/// an immutable timestamped snapshot per completion. Archival is strictly
/// best-effort; a full disk degrades durability, never job outcomes.
#[derive(Clone)]
pub struct RunArchive {
    dir: PathBuf,
}

impl RunArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write both snapshot files for a finished result. Error results are
    /// never archived; they live in the status slot only. Write failures are
    /// logged and swallowed.
    pub async fn archive(&self, result: &JobResult, url_hint: Option<&UrlHint>) {
        if result.error.is_some() {
            return;
        }

        let mut result = result.clone();
        if let Some(hint) = url_hint {
            backfill_urls(&mut result, hint);
        }

        if let Err(e) = self.write_snapshots(&result).await {
            tracing::warn!(job_id = %result.id, error = %e, "failed to write run snapshots");
        }
    }

    async fn write_snapshots(&self, result: &JobResult) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(result)?;

        let stable = self.dir.join(format!("last_job_{}.json", result.id));
        tokio::fs::write(&stable, &bytes).await?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
        let snapshot = self.dir.join(format!("job_{}_{stamp}.json", result.id));
        tokio::fs::write(&snapshot, &bytes).await?;
        Ok(())
    }
}

/// Give every record that has an id but no usable `url` a link derived from
/// the backend's template. Applies to record-list responses only; records the
/// backend already linked are left alone.
fn backfill_urls(result: &mut JobResult, hint: &UrlHint) {
    let Some(Value::Array(records)) = result.response.as_mut() else {
        return;
    };
    for record in records {
        let Some(map) = record.as_object_mut() else {
            continue;
        };
        let Some(id) = map.get(&hint.id_field).and_then(record_id) else {
            continue;
        };
        let missing = match map.get("url") {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing {
            map.insert("url".to_string(), Value::String(hint.url_for(&id)));
        }
    }
}

fn record_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
