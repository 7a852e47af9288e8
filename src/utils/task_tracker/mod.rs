//! Tracks the pipeline loops spawned by `MarqueeService::start`.
//!
//! The poller and the display coordinator are registered by name so `stop`
//! can wait for them, then abort stragglers. The reply worker and the status
//! server manage their own lifetimes.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct TaskTracker {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Track a spawned task under `name`
    pub async fn spawn(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        let name = name.into();
        let mut tasks = self.tasks.lock().await;
        // A worker with this name is already running; replace it
        if let Some(old_handle) = tasks.remove(&name) {
            warn!("Aborting existing task '{}' before tracking new one", name);
            old_handle.abort();
        }
        tasks.insert(name, handle);
    }

    /// Names of tracked tasks that have not finished yet.
    pub async fn running(&self) -> Vec<String> {
        let tasks = self.tasks.lock().await;
        let mut names: Vec<String> = tasks
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Wait up to `timeout` for every tracked task to exit on its own, then
    /// abort whatever is still running.
    pub async fn wait_all(&self, timeout: Duration) {
        let tasks: HashMap<String, JoinHandle<()>> = {
            let mut guard = self.tasks.lock().await;
            guard.drain().collect()
        };
        let deadline = tokio::time::Instant::now() + timeout;
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => debug!("Task '{}' exited", name),
                Err(_) => {
                    warn!("Task '{}' did not exit in time, aborting", name);
                    handle.abort();
                }
            }
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}
