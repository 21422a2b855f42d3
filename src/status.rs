//! Per-run progress log.
//!
//! The loop is the only writer. Observers read `current()` or `history()` from
//! any thread; each entry is pushed whole under the write lock so a reader never
//! sees a half-built entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// What the agent is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Starting,
    Setup,
    Reflection,
    Navigating,
    Clicking,
    Typing,
    Scrolling,
    Looking,
    Waiting,
    FinishingUp,
    Breaking,
    Stopped,
    Cleanup,
    Error,
    Idle,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Activity::Starting => "starting",
            Activity::Setup => "setup",
            Activity::Reflection => "reflection",
            Activity::Navigating => "navigating",
            Activity::Clicking => "clicking",
            Activity::Typing => "typing",
            Activity::Scrolling => "scrolling",
            Activity::Looking => "looking",
            Activity::Waiting => "waiting",
            Activity::FinishingUp => "finishing up",
            Activity::Breaking => "breaking",
            Activity::Stopped => "stopped",
            Activity::Cleanup => "cleanup",
            Activity::Error => "error",
            Activity::Idle => "idle",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: Option<String>,
    #[serde(rename = "screenshotRef")]
    pub screenshot_ref: Option<String>,
}

impl StatusEntry {
    /// Sentinel returned before anything was published.
    pub fn idle() -> Self {
        Self {
            timestamp: Utc::now(),
            action: Activity::Idle.as_str().to_string(),
            details: None,
            screenshot_ref: None,
        }
    }
}

/// Callback invoked synchronously after each entry is appended.
pub type StatusObserver = Arc<dyn Fn(&StatusEntry) + Send + Sync>;

#[derive(Clone, Default)]
pub struct StatusChannel {
    log: Arc<RwLock<Vec<StatusEntry>>>,
    observer: Option<StatusObserver>,
}

impl StatusChannel {
    pub fn new(observer: Option<StatusObserver>) -> Self {
        Self {
            log: Arc::default(),
            observer,
        }
    }

    pub fn update(&self, activity: Activity, details: Option<String>, snapshot: Option<&Path>) {
        let entry = StatusEntry {
            timestamp: Utc::now(),
            action: activity.as_str().to_string(),
            details,
            screenshot_ref: snapshot.map(|p| p.display().to_string()),
        };
        tracing::debug!(action = %activity, details = ?entry.details, "status");

        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());

        if let Some(observer) = &self.observer {
            observer(&entry);
        }
    }

    pub fn current(&self) -> StatusEntry {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or_else(StatusEntry::idle)
    }

    pub fn history(&self) -> Vec<StatusEntry> {
        self.log.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl fmt::Debug for StatusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusChannel")
            .field("entries", &self.history().len())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
