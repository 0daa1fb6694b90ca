use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Persisted quota state for one backend: the epoch-seconds timestamp until
/// which calls should not be attempted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<f64>,
}

/// Block-state storage shared by every process that talks to a backend.
///
/// Reads are infallible: a missing, unreadable or corrupt state reads as
/// "not blocked". A state that cannot be read must never stop a worker.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn blocked_until(&self, backend: &str) -> Option<f64>;

    async fn set_blocked_until(&self, backend: &str, until: f64) -> anyhow::Result<()>;

    async fn clear(&self, backend: &str) -> anyhow::Result<()>;
}

const LOCK_WAIT: Duration = Duration::from_millis(500);
const LOCK_POLL: Duration = Duration::from_millis(25);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);

/// One JSON file per backend (`<backend>_state.json`) under a shared state
/// directory, so concurrently running workers coordinate their backoff.
///
/// Writes go through a temp file, fsync and an atomic rename, serialized by a
/// cooperative `.lock` file. A peer holding the lock past [`LOCK_WAIT`] does
/// not stall the write: the rename is atomic either way, and last writer wins.
#[derive(Clone)]
pub struct FileBlockStore {
    dir: PathBuf,
}

impl FileBlockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn state_path(&self, backend: &str) -> PathBuf {
        self.dir.join(format!("{backend}_state.json"))
    }

    async fn read_state(&self, backend: &str) -> BlockState {
        let path = self.state_path(backend);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "unreadable block state, treating as empty");
                BlockState::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => BlockState::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "block state read failed, treating as empty");
                BlockState::default()
            }
        }
    }

    async fn write_state(&self, backend: &str, state: &BlockState) -> anyhow::Result<()> {
        let path = self.state_path(backend);
        tokio::fs::create_dir_all(&self.dir).await?;

        let lock = acquire_lock(&lock_path(&path)).await;

        // temp file + fsync + rename, so a crash mid-write leaves the old
        // state intact instead of a torn file
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(state)?;
        {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, &path).await?;

        // sync the directory so the rename itself survives a crash
        if let Ok(dir) = tokio::fs::File::open(&self.dir).await {
            let _ = dir.sync_all().await;
        }

        drop(lock);
        Ok(())
    }
}

#[async_trait]
impl BlockStore for FileBlockStore {
    async fn blocked_until(&self, backend: &str) -> Option<f64> {
        self.read_state(backend).await.blocked_until
    }

    async fn set_blocked_until(&self, backend: &str, until: f64) -> anyhow::Result<()> {
        let mut state = self.read_state(backend).await;
        state.blocked_until = Some(until);
        self.write_state(backend, &state).await
    }

    async fn clear(&self, backend: &str) -> anyhow::Result<()> {
        let mut state = self.read_state(backend).await;
        if state.blocked_until.take().is_some() {
            self.write_state(backend, &state).await?;
        }
        Ok(())
    }
}

fn lock_path(state_path: &Path) -> PathBuf {
    state_path.with_extension("json.lock")
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to create the lock file exclusively, polling up to [`LOCK_WAIT`].
/// Returns `None` when the lock could not be taken; callers proceed anyway.
async fn acquire_lock(path: &Path) -> Option<LockGuard> {
    let deadline = Instant::now() + LOCK_WAIT;
    loop {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(_) => {
                return Some(LockGuard {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                remove_if_stale(path);
                if Instant::now() >= deadline {
                    tracing::debug!(path = %path.display(), "lock wait elapsed, writing unlocked");
                    return None;
                }
                tokio::time::sleep(LOCK_POLL).await;
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "lock create failed, writing unlocked");
                return None;
            }
        }
    }
}

/// A lock file left behind by a crashed peer would otherwise tax every write
/// with the full wait.
fn remove_if_stale(path: &Path) {
    let stale = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > LOCK_STALE_AFTER)
        .unwrap_or(false);
    if stale {
        let _ = std::fs::remove_file(path);
    }
}

/// In-memory [`BlockStore`] for tests.
#[derive(Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<Mutex<std::collections::HashMap<String, f64>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn blocked_until(&self, backend: &str) -> Option<f64> {
        self.blocks.lock().await.get(backend).copied()
    }

    async fn set_blocked_until(&self, backend: &str, until: f64) -> anyhow::Result<()> {
        self.blocks.lock().await.insert(backend.to_string(), until);
        Ok(())
    }

    async fn clear(&self, backend: &str) -> anyhow::Result<()> {
        self.blocks.lock().await.remove(backend);
        Ok(())
    }
}
