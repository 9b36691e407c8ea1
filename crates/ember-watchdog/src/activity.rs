//! Worker activity sources.
//!
//! The watchdog judges idleness from periodic snapshots of per-worker
//! task counts. On a live node those come from the co-located
//! scheduler's dashboard; tests script them.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use ember_core::{WorkerActivity, WorkerActivitySnapshot, DASHBOARD_PORT};

pub type ActivityResult<T> = Result<T, ActivityError>;

/// A snapshot could not be read. Always retryable from the watchdog's
/// point of view.
#[derive(Debug, Clone, Error)]
pub enum ActivityError {
    #[error("activity transport error: {0}")]
    Transport(String),

    #[error("activity endpoint answered status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for ActivityError {
    fn from(err: reqwest::Error) -> Self {
        ActivityError::Transport(err.to_string())
    }
}

/// Periodic reader of per-worker task counts. The first successful
/// fetch doubles as the scheduler-is-up signal during node boot.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn fetch(&self) -> ActivityResult<WorkerActivitySnapshot>;
}

/// Reads `{worker_id: {"executing": n}}` from a scheduler dashboard's
/// workers endpoint.
pub struct HttpActivitySource {
    client: reqwest::Client,
    url: String,
}

impl HttpActivitySource {
    pub fn new(url: &str) -> ActivityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(HttpActivitySource {
            client,
            url: url.to_string(),
        })
    }

    /// Source for the scheduler co-located with the watchdog.
    pub fn local() -> ActivityResult<Self> {
        HttpActivitySource::new(&format!("http://127.0.0.1:{}/api/workers", DASHBOARD_PORT))
    }
}

#[async_trait]
impl ActivitySource for HttpActivitySource {
    async fn fetch(&self) -> ActivityResult<WorkerActivitySnapshot> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(ActivityError::Status(response.status().as_u16()));
        }
        let workers: HashMap<String, WorkerActivity> = response.json().await?;
        Ok(WorkerActivitySnapshot { workers })
    }
}

/// Replays a scripted sequence of snapshots and failures. The last
/// entry repeats once the script drains; an empty script reads all-idle.
#[derive(Default)]
pub struct ScriptedActivity {
    script: Mutex<VecDeque<Entry>>,
    fetches: Mutex<u64>,
}

#[derive(Clone)]
enum Entry {
    Snapshot(WorkerActivitySnapshot),
    Failure,
}

fn snapshot(executing: u64) -> WorkerActivitySnapshot {
    let mut workers = HashMap::new();
    workers.insert("worker-0".to_string(), WorkerActivity { executing });
    WorkerActivitySnapshot { workers }
}

impl ScriptedActivity {
    pub fn new() -> Self {
        ScriptedActivity::default()
    }

    pub async fn push_idle(&self, n: u32) {
        let mut script = self.script.lock().await;
        for _ in 0..n {
            script.push_back(Entry::Snapshot(snapshot(0)));
        }
    }

    pub async fn push_busy(&self, n: u32) {
        let mut script = self.script.lock().await;
        for _ in 0..n {
            script.push_back(Entry::Snapshot(snapshot(3)));
        }
    }

    pub async fn push_failures(&self, n: u32) {
        let mut script = self.script.lock().await;
        for _ in 0..n {
            script.push_back(Entry::Failure);
        }
    }

    pub async fn fetches(&self) -> u64 {
        *self.fetches.lock().await
    }
}

#[async_trait]
impl ActivitySource for ScriptedActivity {
    async fn fetch(&self) -> ActivityResult<WorkerActivitySnapshot> {
        *self.fetches.lock().await += 1;
        let mut script = self.script.lock().await;
        let entry = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Entry::Snapshot(snapshot(0)))
        };
        match entry {
            Entry::Snapshot(snapshot) => Ok(snapshot),
            Entry::Failure => Err(ActivityError::Transport("injected failure".to_string())),
        }
    }
}
