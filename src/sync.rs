//! Loading and saving the task collection.
//!
//! The durable copy lives behind a [`Remote`]; a [`LocalMirror`] file keeps
//! the last known collection for when the remote cannot be reached.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::kv::{write_atomic, FileKv, KvStore, TASKS_KEY};
use crate::task::Task;

#[async_trait]
pub trait Remote: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Task>>;
    async fn store(&self, tasks: &[Task]) -> Result<()>;
}

/// Reads and writes the task slot of a key-value store directly.
pub struct KvRemote {
    kv: Arc<dyn KvStore>,
}

impl KvRemote {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl Remote for KvRemote {
    async fn fetch(&self) -> Result<Vec<Task>> {
        match self.kv.get(TASKS_KEY).await? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    async fn store(&self, tasks: &[Task]) -> Result<()> {
        let blob = serde_json::to_string(tasks)?;
        self.kv.put(TASKS_KEY, &blob).await
    }
}

#[derive(Debug, Deserialize)]
struct TasksEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct SaveBody<'a> {
    tasks: &'a [Task],
}

#[derive(Debug, Deserialize)]
struct SaveEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Talks to the `/tasks` endpoint of a running `taskdash serve`.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.base_url)
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn fetch(&self) -> Result<Vec<Task>> {
        let response = self.client.get(self.tasks_url()).send().await?;
        let status = response.status().as_u16();
        let envelope: TasksEnvelope = response.json().await?;
        if !envelope.success {
            return Err(Error::Upstream {
                status,
                message: envelope.error.unwrap_or_default(),
            });
        }
        Ok(envelope.tasks)
    }

    async fn store(&self, tasks: &[Task]) -> Result<()> {
        let response = self
            .client
            .post(self.tasks_url())
            .json(&SaveBody { tasks })
            .send()
            .await?;
        let status = response.status().as_u16();
        let envelope: SaveEnvelope = response.json().await?;
        if !envelope.success {
            return Err(Error::Upstream {
                status,
                message: envelope.error.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Per-user copy of the collection, used when the remote is unreachable.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    path: PathBuf,
}

impl LocalMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<Task>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, tasks: &[Task]) -> Result<()> {
        write_atomic(&self.path, &serde_json::to_string_pretty(tasks)?).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    Mirror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saved {
    Everywhere,
    /// The remote write failed; only the local mirror has the change.
    MirrorOnly,
}

pub struct TaskSync {
    remote: Box<dyn Remote>,
    mirror: LocalMirror,
}

impl TaskSync {
    pub fn new(remote: Box<dyn Remote>, mirror: LocalMirror) -> Self {
        Self { remote, mirror }
    }

    /// Uses the HTTP API when `api.base_url` is set, otherwise the file store.
    pub fn from_config(config: &Config) -> Result<Self> {
        let remote: Box<dyn Remote> = match config.api.base_url.as_deref() {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(5))
                    .build()?;
                Box::new(HttpRemote::new(client, url))
            }
            None => Box::new(KvRemote::new(Arc::new(FileKv::new(config.store_dir())))),
        };
        Ok(Self::new(remote, LocalMirror::new(config.mirror_path())))
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    pub async fn load(&self) -> Result<(Vec<Task>, Source)> {
        match self.remote.fetch().await {
            Ok(tasks) => {
                if let Err(e) = self.mirror.write(&tasks).await {
                    warn!("Failed to refresh local mirror: {}", e);
                }
                debug!(count = tasks.len(), "loaded tasks from remote");
                Ok((tasks, Source::Remote))
            }
            Err(e) => {
                warn!("Remote unavailable, using local mirror: {}", e);
                Ok((self.mirror.read().await?, Source::Mirror))
            }
        }
    }

    pub async fn save(&self, tasks: &[Task]) -> Result<Saved> {
        self.mirror.write(tasks).await?;
        match self.remote.store(tasks).await {
            Ok(()) => Ok(Saved::Everywhere),
            Err(e) => {
                warn!("Failed to save tasks remotely: {}", e);
                Ok(Saved::MirrorOnly)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extractor;
    use crate::kanban_board::KanbanBoard;
    use crate::kv::MemoryKv;
    use chrono::NaiveDate;

    struct Unreachable;

    #[async_trait]
    impl Remote for Unreachable {
        async fn fetch(&self) -> Result<Vec<Task>> {
            Err(Error::NotConfigured("remote"))
        }

        async fn store(&self, _tasks: &[Task]) -> Result<()> {
            Err(Error::NotConfigured("remote"))
        }
    }

    fn sample_tasks() -> Vec<Task> {
        let extractor = Extractor::default();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let mut board = KanbanBoard::default();
        for text in ["book the venue tomorrow", "jarvis send invoices", "gym"] {
            board.create(extractor.extract(text, today)).unwrap();
        }
        board.tasks().to_vec()
    }

    #[tokio::test]
    async fn blob_round_trip_keeps_order() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let remote = KvRemote::new(kv.clone());
        let tasks = sample_tasks();
        remote.store(&tasks).await.unwrap();
        assert_eq!(remote.fetch().await.unwrap(), tasks);
    }

    #[tokio::test]
    async fn load_refreshes_mirror_from_remote() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("tasks.json"));
        mirror.write(&sample_tasks()[..1]).await.unwrap();

        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let tasks = sample_tasks();
        KvRemote::new(kv.clone()).store(&tasks).await.unwrap();

        let sync = TaskSync::new(Box::new(KvRemote::new(kv)), mirror.clone());
        let (loaded, source) = sync.load().await.unwrap();
        assert_eq!(source, Source::Remote);
        assert_eq!(loaded, tasks);
        assert_eq!(mirror.read().await.unwrap(), tasks);
    }

    #[tokio::test]
    async fn load_falls_back_to_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("nested/tasks.json"));
        let tasks = sample_tasks();
        mirror.write(&tasks).await.unwrap();

        let sync = TaskSync::new(Box::new(Unreachable), mirror);
        let (loaded, source) = sync.load().await.unwrap();
        assert_eq!(source, Source::Mirror);
        assert_eq!(loaded, tasks);
    }

    #[tokio::test]
    async fn save_keeps_mirror_when_remote_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("tasks.json"));
        let sync = TaskSync::new(Box::new(Unreachable), mirror.clone());
        let tasks = sample_tasks();
        assert_eq!(sync.save(&tasks).await.unwrap(), Saved::MirrorOnly);
        assert_eq!(mirror.read().await.unwrap(), tasks);
    }

    #[tokio::test]
    async fn empty_slot_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sync = TaskSync::new(
            Box::new(KvRemote::new(Arc::new(MemoryKv::new()))),
            LocalMirror::new(dir.path().join("tasks.json")),
        );
        let (loaded, source) = sync.load().await.unwrap();
        assert!(loaded.is_empty());
        assert_eq!(source, Source::Remote);
    }

    #[tokio::test]
    async fn mirror_writes_replace_the_file_whole() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = LocalMirror::new(dir.path().join("tasks.json"));
        let tasks = sample_tasks();
        mirror.write(&tasks).await.unwrap();
        mirror.write(&tasks[..1]).await.unwrap();

        assert_eq!(mirror.read().await.unwrap(), tasks[..1].to_vec());
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tasks.json".to_string()]);
    }
}
