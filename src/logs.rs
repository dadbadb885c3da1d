//! Pod log tails shown in dock tabs.
//!
//! A tab moves through `Idle -> Loading -> Loaded`, and `Loaded <-> LoadingMore`
//! while older lines are fetched. Only one fetch per tab is outstanding;
//! further calls return [`LoadOutcome::Skipped`] instead of queuing.
//!
//! Fetches cannot be aborted. Stopping or reloading bumps the tab's generation,
//! and a result arriving for an older generation is discarded.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::dock::{TabDataStore, TabId};
use crate::{Config, Result};

mod line;
mod search;
pub use search::LogSearch;
mod source;
pub use source::{LogRequest, LogSource, LogTarget, PodLogSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    LoadingMore,
}

impl LogLoadState {
    pub fn is_busy(self) -> bool {
        matches!(self, LogLoadState::Loading | LogLoadState::LoadingMore)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The fetched lines were merged into the tab.
    Applied { new_lines: usize },
    /// Another fetch for the tab was still outstanding, or there was nothing to extend.
    Skipped,
    /// The tab was stopped, reloaded or closed while fetching.
    Discarded,
}

/// Per-tab view options of a log tab, kept in a `DockTabStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTabData {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    #[serde(default)]
    pub show_timestamps: bool,
    #[serde(default)]
    pub show_previous: bool,
}

impl LogTabData {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>, container: Option<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container,
            show_timestamps: false,
            show_previous: false,
        }
    }

    pub fn target(&self) -> LogTarget {
        LogTarget {
            namespace: self.namespace.clone(),
            pod: self.pod.clone(),
            container: self.container.clone(),
            previous: self.show_previous,
        }
    }
}

#[derive(Debug, Default)]
struct LogSession {
    lines: Vec<String>,
    state: LogLoadState,
    generation: u64,
    error: Option<String>,
}

impl LogSession {
    fn settled_state(&self) -> LogLoadState {
        if self.lines.is_empty() {
            LogLoadState::Idle
        } else {
            LogLoadState::Loaded
        }
    }
}

pub struct LogStore {
    source: Arc<dyn LogSource>,
    lines_to_load: usize,
    sessions: Mutex<HashMap<TabId, LogSession>>,
    revision: watch::Sender<u64>,
}

impl LogStore {
    pub fn new(source: Arc<dyn LogSource>, config: &Config) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            source,
            lines_to_load: config.log_lines_to_load.max(1),
            sessions: Mutex::new(HashMap::new()),
            revision,
        }
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Fetches the log tail and appends the lines newer than those already held.
    pub async fn load(&self, tab_id: &str, target: &LogTarget) -> Result<LoadOutcome> {
        let Some((generation, _)) = self.begin(tab_id, LogLoadState::Loading) else {
            return Ok(LoadOutcome::Skipped);
        };

        let request = LogRequest {
            tail_lines: Some(to_tail(self.lines_to_load)),
        };
        let fetched = self.source.fetch(target, request).await;
        self.finish(tab_id, generation, fetched, line::append_newer)
    }

    /// Fetches a longer tail and prepends the lines older than the oldest held line.
    pub async fn load_more(&self, tab_id: &str, target: &LogTarget) -> Result<LoadOutcome> {
        let Some((generation, held)) = self.begin(tab_id, LogLoadState::LoadingMore) else {
            return Ok(LoadOutcome::Skipped);
        };

        let request = LogRequest {
            tail_lines: Some(to_tail(held + self.lines_to_load)),
        };
        let fetched = self.source.fetch(target, request).await;
        self.finish(tab_id, generation, fetched, line::prepend_older)
    }

    /// Drops the held lines and any outstanding fetch, then loads from scratch.
    pub async fn reload(&self, tab_id: &str, target: &LogTarget) -> Result<LoadOutcome> {
        {
            let mut sessions = self.sessions.lock();
            let session = sessions.entry(tab_id.to_owned()).or_default();
            session.lines.clear();
            session.generation += 1;
            session.state = LogLoadState::Idle;
            session.error = None;
        }
        self.notify();
        self.load(tab_id, target).await
    }

    /// Ignores the result of the outstanding fetch of the tab, if any.
    pub fn stop_loading_logs(&self, tab_id: &str) {
        {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(tab_id) else {
                return;
            };
            session.generation += 1;
            session.state = session.settled_state();
        }
        log::debug!("stopped loading logs of tab {tab_id}");
        self.notify();
    }

    /// Held lines, oldest first, optionally with their timestamp prefix removed.
    pub fn logs(&self, tab_id: &str, show_timestamps: bool) -> Vec<String> {
        let sessions = self.sessions.lock();
        let Some(session) = sessions.get(tab_id) else {
            return Vec::new();
        };
        if show_timestamps {
            session.lines.clone()
        } else {
            session
                .lines
                .iter()
                .map(|text| line::strip_timestamp(text).to_owned())
                .collect()
        }
    }

    pub fn state(&self, tab_id: &str) -> LogLoadState {
        self.sessions
            .lock()
            .get(tab_id)
            .map_or(LogLoadState::Idle, |session| session.state)
    }

    pub fn is_loading(&self, tab_id: &str) -> bool {
        self.state(tab_id).is_busy()
    }

    /// Message of the last failed fetch, cleared by the next successful one.
    pub fn error(&self, tab_id: &str) -> Option<String> {
        self.sessions.lock().get(tab_id)?.error.clone()
    }

    /// Timestamp of the newest held line.
    pub fn last_loaded(&self, tab_id: &str) -> Option<DateTime<FixedOffset>> {
        let sessions = self.sessions.lock();
        let newest = sessions.get(tab_id)?.lines.last()?;
        line::timestamp(newest)
    }

    pub fn clear_data(&self, tab_id: &str) {
        if self.sessions.lock().remove(tab_id).is_some() {
            self.notify();
        }
    }

    /// Marks the tab busy. Returns its generation and the number of held lines,
    /// or `None` if the fetch should not start.
    fn begin(&self, tab_id: &str, busy: LogLoadState) -> Option<(u64, usize)> {
        let started = {
            let mut sessions = self.sessions.lock();
            let session = sessions.entry(tab_id.to_owned()).or_default();
            let can_start = match busy {
                LogLoadState::LoadingMore => session.state == LogLoadState::Loaded && !session.lines.is_empty(),
                _ => !session.state.is_busy(),
            };
            can_start.then(|| {
                session.state = busy;
                (session.generation, session.lines.len())
            })
        };
        if started.is_some() {
            self.notify();
        }
        started
    }

    fn finish(
        &self,
        tab_id: &str,
        generation: u64,
        fetched: Result<String>,
        merge: fn(&mut Vec<String>, Vec<String>) -> usize,
    ) -> Result<LoadOutcome> {
        let outcome = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(tab_id).filter(|session| session.generation == generation) else {
                log::debug!("discarding stale log fetch of tab {tab_id}");
                return Ok(LoadOutcome::Discarded);
            };

            match fetched {
                Ok(text) => {
                    let new_lines = merge(&mut session.lines, line::split_lines(&text));
                    session.error = None;
                    session.state = session.settled_state();
                    Ok(LoadOutcome::Applied { new_lines })
                }
                Err(err) => {
                    log::warn!("failed to load logs of tab {tab_id}: {err}");
                    session.error = Some(err.to_string());
                    session.state = session.settled_state();
                    Err(err)
                }
            }
        };
        self.notify();
        outcome
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl TabDataStore for LogStore {
    fn clear_data(&self, tab_id: &str) {
        LogStore::clear_data(self, tab_id);
    }
}

fn to_tail(lines: usize) -> i64 {
    i64::try_from(lines).unwrap_or(i64::MAX)
}
