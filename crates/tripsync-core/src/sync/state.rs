//! Sync state
//!
//! In-flight flags that keep two runs of the same kind from overlapping,
//! plus a small history of the last push and pull persisted between
//! sessions.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pull::PullSummary;
use super::push::PushSummary;

/// The two independent kinds of run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Push,
    Pull,
}

/// Last outcomes, saved as JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncHistory {
    #[serde(default)]
    pub last_push_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_push: Option<PushSummary>,
    #[serde(default)]
    pub last_pull_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_pull: Option<PullSummary>,
    /// Message of the last run that failed outright
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Releases its in-flight flag when dropped
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// State owned by one orchestrator
#[derive(Debug, Default)]
pub struct SyncState {
    pushing: AtomicBool,
    pulling: AtomicBool,
    history: Mutex<SyncHistory>,
    /// Path to persist history
    path: Option<PathBuf>,
}

impl SyncState {
    /// Create a new sync state (in-memory only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sync state that persists its history to disk
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let history = if path.exists() {
            let json = fs::read_to_string(&path).context("Failed to read sync state")?;
            serde_json::from_str(&json).context("Failed to parse sync state")?
        } else {
            SyncHistory::default()
        };

        Ok(Self {
            history: Mutex::new(history),
            path: Some(path),
            ..Self::default()
        })
    }

    fn flag(&self, kind: SyncKind) -> &AtomicBool {
        match kind {
            SyncKind::Push => &self.pushing,
            SyncKind::Pull => &self.pulling,
        }
    }

    /// Mark a run as started; `None` if one of the same kind is in flight
    pub fn try_begin(&self, kind: SyncKind) -> Option<InFlightGuard<'_>> {
        let flag = self.flag(kind);
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag })
    }

    pub fn is_running(&self, kind: SyncKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        !self.is_running(SyncKind::Push) && !self.is_running(SyncKind::Pull)
    }

    pub fn history(&self) -> SyncHistory {
        self.lock_history().clone()
    }

    pub fn record_push(&self, summary: PushSummary) {
        let mut history = self.lock_history();
        history.last_push_at = Some(Utc::now());
        history.last_push = Some(summary);
        history.last_error = None;
    }

    pub fn record_pull(&self, summary: PullSummary) {
        let mut history = self.lock_history();
        history.last_pull_at = Some(Utc::now());
        history.last_pull = Some(summary);
        history.last_error = None;
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.lock_history().last_error = Some(message.into());
    }

    /// Save history to disk
    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.history())?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, json).context("Failed to save sync state")?;
        Ok(())
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, SyncHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
