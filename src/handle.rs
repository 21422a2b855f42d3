use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::status::{StatusChannel, StatusEntry, StatusObserver};
use crate::trajectory::Trajectory;
use crate::types::Step;

/// Everything an outside caller needs to watch or stop one run.
///
/// Built fresh for every run and cheap to clone; all clones share state.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: Uuid,
    status: StatusChannel,
    cancel: CancellationToken,
    trajectory: Trajectory,
    claimed: Arc<AtomicBool>,
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunHandle {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_observer(observer: StatusObserver) -> Self {
        Self::build(Some(observer))
    }

    fn build(observer: Option<StatusObserver>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: StatusChannel::new(observer),
            cancel: CancellationToken::new(),
            trajectory: Trajectory::default(),
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the run to stop before its next round. Calling it again does nothing.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(run = %self.id, "stop requested");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn current_status(&self) -> StatusEntry {
        self.status.current()
    }

    pub fn history(&self) -> Vec<StatusEntry> {
        self.status.history()
    }

    pub fn trajectory(&self) -> Vec<Step> {
        self.trajectory.snapshot()
    }

    pub(crate) fn status(&self) -> &StatusChannel {
        &self.status
    }

    pub(crate) fn steps(&self) -> &Trajectory {
        &self.trajectory
    }

    pub(crate) fn claim(&self) -> Result<()> {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return Err(AgentError::HandleReused);
        }
        Ok(())
    }
}
