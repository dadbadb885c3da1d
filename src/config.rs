use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::dock::{JsonFileBackend, MemoryBackend, StorageBackend};
use crate::Result;

/// Number of log lines fetched per load when nothing else is configured.
pub const DEFAULT_LOG_LINES_TO_LOAD: usize = 500;

/// Tunables shared by the stores of one cluster frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Tail size requested by each log load.
    pub log_lines_to_load: usize,
    /// Server-side timeout of a single watch request, in seconds.
    pub watch_timeout_secs: Option<u32>,
    /// Directory where persisted dock state is written.
    pub storage_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_lines_to_load: DEFAULT_LOG_LINES_TO_LOAD,
            watch_timeout_secs: None,
            storage_dir: None,
        }
    }
}

impl Config {
    /// Reads a config from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config = serde_json::from_slice(&bytes)?;
        Ok(config)
    }

    /// Sets the log tail size. Zero is treated as one line.
    pub fn with_log_lines_to_load(mut self, lines: usize) -> Self {
        self.log_lines_to_load = lines.max(1);
        self
    }

    pub fn with_watch_timeout_secs(mut self, secs: u32) -> Self {
        self.watch_timeout_secs = Some(secs);
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Watcher configuration for live watch connections.
    pub fn watcher_config(&self) -> kube_runtime::watcher::Config {
        let config = kube_runtime::watcher::Config::default();
        match self.watch_timeout_secs {
            Some(secs) => config.timeout(secs),
            None => config,
        }
    }

    /// Path of the JSON file backing the given storage file name, if persistence is enabled.
    pub fn storage_file(&self, file_name: &str) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|dir| dir.join(format!("{file_name}.json")))
    }

    /// Storage for dock and tab state: a JSON file under `storage_dir`, or memory when unset.
    pub fn storage_backend(&self, file_name: &str) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = match self.storage_file(file_name) {
            Some(path) => Arc::new(JsonFileBackend::open(path)?),
            None => Arc::new(MemoryBackend::default()),
        };
        Ok(backend)
    }
}
