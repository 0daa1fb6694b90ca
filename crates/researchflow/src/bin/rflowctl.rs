use std::env;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use researchflow::agents::{BlockStore, FileBlockStore};
use researchflow::config::Config;
use researchflow::jobs::epoch_seconds;
use researchflow::jobs::model::Job;
use researchflow::store::{RedisStore, TaskStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "rflowctl <command>\n\
             Commands:\n\
             - enqueue <json-payload>\n\
             - status <job-id>\n\
             - list-runs [pattern]\n\
             - prune-runs --days <n> [--dry-run]\n\
             - show-block <backend>\n\
             - clear-block <backend>\n\
             \n\
             Uses RFLOW_REDIS_URL / REDIS_URL and the RFLOW_* directories.\n"
        );
        std::process::exit(2);
    }

    let cfg = Config::from_env()?;

    match args[1].as_str() {
        "enqueue" => {
            let payload = args.get(2).expect("usage: rflowctl enqueue <json-payload>");
            enqueue(&cfg, payload).await?;
        }
        "status" => {
            let id = args.get(2).expect("usage: rflowctl status <job-id>");
            status(&cfg, id).await?;
        }
        "list-runs" => {
            list_runs(&cfg, args.get(2).map(String::as_str))?;
        }
        "prune-runs" => {
            let (days, dry_run) = parse_prune_args(&args[2..]);
            prune_runs(&cfg, days, dry_run)?;
        }
        "show-block" => {
            let backend = args.get(2).expect("usage: rflowctl show-block <backend>");
            show_block(&cfg, backend).await;
        }
        "clear-block" => {
            let backend = args.get(2).expect("usage: rflowctl clear-block <backend>");
            clear_block(&cfg, backend).await?;
        }
        other => {
            eprintln!("Unknown command: {other}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn parse_prune_args(rest: &[String]) -> (i64, bool) {
    let mut days: Option<i64> = None;
    let mut dry_run = false;

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--days" => {
                days = iter.next().and_then(|v| v.parse().ok());
            }
            "--dry-run" => dry_run = true,
            other => {
                eprintln!("Unknown prune-runs argument: {other}");
                std::process::exit(2);
            }
        }
    }

    let days = days.expect("usage: rflowctl prune-runs --days <n> [--dry-run]");
    (days, dry_run)
}

async fn enqueue(cfg: &Config, payload: &str) -> anyhow::Result<()> {
    let payload: Value = serde_json::from_str(payload)?;
    anyhow::ensure!(payload.is_object(), "payload must be a JSON object");

    let job = Job::new(Uuid::new_v4().to_string(), payload);
    let raw = serde_json::to_string(&job)?;

    let store = RedisStore::connect(&cfg.redis_url).await?;
    store.push(&cfg.queue_key, &raw).await?;

    println!("+ enqueued job id={}", job.id);
    Ok(())
}

async fn status(cfg: &Config, job_id: &str) -> anyhow::Result<()> {
    let store = RedisStore::connect(&cfg.redis_url).await?;
    match store.get_status(job_id).await? {
        Some(raw) => println!("{raw}"),
        None => println!("{{\"status\": \"pending\"}}"),
    }
    Ok(())
}

fn list_runs(cfg: &Config, pattern: Option<&str>) -> anyhow::Result<()> {
    let pattern = pattern.unwrap_or("job_");
    let mut names: Vec<String> = match fs::read_dir(&cfg.runs_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.contains(pattern) && name.ends_with(".json"))
            .collect(),
        Err(_) => {
            println!("no runs directory at {}", cfg.runs_dir.display());
            return Ok(());
        }
    };
    names.sort();

    for name in &names {
        let path = cfg.runs_dir.join(name);
        println!("{name}  {}", summarize_run(&path));
    }
    println!("{} file(s)", names.len());
    Ok(())
}

fn summarize_run(path: &Path) -> String {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
        .unwrap_or_else(|_| "-".to_string());

    let records = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .map(|run| match run.get("response") {
            Some(Value::Array(items)) => items.len().to_string(),
            Some(Value::Null) | None => "0".to_string(),
            Some(_) => "1".to_string(),
        })
        .unwrap_or_else(|| "?".to_string());

    format!("records={records} modified={modified}")
}

/// Delete timestamped snapshots older than the cutoff. The stable
/// `last_job_<id>.json` files are never pruned.
fn prune_runs(cfg: &Config, days: i64, dry_run: bool) -> anyhow::Result<()> {
    let cutoff = Utc::now() - Duration::days(days);
    let entries = match fs::read_dir(&cfg.runs_dir) {
        Ok(entries) => entries,
        Err(_) => {
            println!("no runs directory at {}", cfg.runs_dir.display());
            return Ok(());
        }
    };

    let mut removed = 0usize;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        let Some(stamp) = snapshot_stamp(&name) else {
            continue;
        };
        if stamp >= cutoff {
            continue;
        }
        if dry_run {
            println!("would remove {name}");
        } else {
            fs::remove_file(entry.path())?;
            println!("removed {name}");
        }
        removed += 1;
    }

    let verb = if dry_run { "would remove" } else { "removed" };
    println!("Done. {verb} {removed} file(s) older than {days} day(s).");
    Ok(())
}

/// Timestamp embedded in a `job_<id>_<stamp>.json` snapshot name, if the name
/// is one.
fn snapshot_stamp(name: &str) -> Option<DateTime<Utc>> {
    let base = name.strip_suffix(".json")?;
    if !base.starts_with("job_") {
        return None;
    }
    let (_, stamp) = base.rsplit_once('_')?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}

async fn show_block(cfg: &Config, backend: &str) {
    let blocks = FileBlockStore::new(&cfg.state_dir);
    match blocks.blocked_until(backend).await {
        Some(until) => {
            let remaining = until - epoch_seconds();
            if remaining > 0.0 {
                println!("backend {backend} blocked for another {remaining:.0}s (until epoch {until:.0})");
            } else {
                println!("backend {backend} block expired {:.0}s ago", -remaining);
            }
        }
        None => println!("backend {backend} is not blocked"),
    }
}

async fn clear_block(cfg: &Config, backend: &str) -> anyhow::Result<()> {
    let blocks = FileBlockStore::new(&cfg.state_dir);
    blocks.clear(backend).await?;
    println!("cleared block state for {backend}");
    Ok(())
}
