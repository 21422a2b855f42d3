//! Goal-driven browser agent.
//!
//! A [`WebAgent`] opens a browser session and runs rounds of
//! observe → reflect → act against a [`Reasoner`] until the goal is finished,
//! abandoned, or the caller stops it through its [`RunHandle`].

pub mod agent;
pub mod brain;
pub mod capability;
pub mod config;
mod dispatch;
mod dom;
pub mod error;
pub mod face;
pub mod handle;
pub mod hands;
pub mod snapshot;
pub mod status;
pub mod trajectory;
pub mod types;

pub use agent::{RoundOutcome, WebAgent, join_run};
pub use brain::LlmReasoner;
pub use capability::{
    Browser, BrowserSession, Page, PointSpace, Reasoner, SessionOptions, Viewport,
};
pub use config::{AgentConfig, LlmConfig};
pub use error::AgentError;
pub use handle::RunHandle;
pub use hands::ChromeBrowser;
pub use status::{Activity, StatusChannel, StatusEntry, StatusObserver};
pub use trajectory::Trajectory;
pub use types::{
    Action, ActionKind, Decision, Observation, Reflection, RunRequest, RunResult, RunStatus, Step,
    StepKind,
};

/// Install the `tracing` subscriber used by the binaries.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,webagent=debug".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
