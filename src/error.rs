use thiserror::Error;

/// Failures that end a run. Everything else is recorded in the trajectory.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to open browser session: {0:#}")]
    Session(#[source] anyhow::Error),

    #[error("lost the active page: {0:#}")]
    Browser(#[source] anyhow::Error),

    #[error("reasoning service failed during {stage}: {source:#}")]
    Reasoning {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("run handle was already used for another run")]
    HandleReused,

    #[error("agent task aborted: {0}")]
    Aborted(String),
}

impl AgentError {
    pub(crate) fn reasoning(stage: &'static str, source: anyhow::Error) -> Self {
        Self::Reasoning { stage, source }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
