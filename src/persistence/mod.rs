pub mod redis_store;

pub use redis_store::RedisStore;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Durable projection of the position plus the startup-sell flag
///
/// Field names match the `state.json` layout operators already have on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub holding: bool,
    pub buy_price: f64,
    pub peak_price: f64,
    #[serde(rename = "FIRST_RUN_SELL_DONE")]
    pub first_run_sell_done: bool,
}

/// Durable storage for the snapshot
///
/// `load` returns the default snapshot when nothing was stored yet.
#[allow(async_fn_in_trait)]
pub trait SnapshotStore {
    async fn load(&mut self) -> Result<Snapshot>;

    async fn save(&mut self, snapshot: &Snapshot) -> Result<()>;
}

/// Snapshot stored as pretty JSON in a local file
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileStore {
    async fn load(&mut self) -> Result<Snapshot> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting fresh", self.path.display());
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        tracing::info!("Loaded state: {:?}", snapshot);
        Ok(snapshot)
    }

    async fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;

        // Write-then-rename so a crash never leaves a truncated file
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::debug!("State saved: {:?}", snapshot);
        Ok(())
    }
}

/// Backend chosen at startup from configuration
pub enum StateStore {
    File(FileStore),
    Redis(RedisStore),
}

impl StateStore {
    pub fn describe(&self) -> String {
        match self {
            StateStore::File(store) => format!("file {}", store.path().display()),
            StateStore::Redis(store) => format!("redis key {}", store.key()),
        }
    }
}

impl SnapshotStore for StateStore {
    async fn load(&mut self) -> Result<Snapshot> {
        match self {
            StateStore::File(store) => store.load().await,
            StateStore::Redis(store) => store.load().await,
        }
    }

    async fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        match self {
            StateStore::File(store) => store.save(snapshot).await,
            StateStore::Redis(store) => store.save(snapshot).await,
        }
    }
}
