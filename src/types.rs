use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Result text recorded when a run ends because `stop()` was called.
pub const STOPPED_BY_USER: &str = "stopped by user";

/// Result text recorded when an observation could not be produced.
pub const OBSERVATION_FAILED: &str = "Failed to get observation";

/// One primitive the reasoning service can ask the agent to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    ScrollDown,
    ScrollUp,
    Look,
    Wait,
}

/// A single action chosen by the reasoning service for the current subgoal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub action_goal: String,
    #[serde(default)]
    pub param: String,
}

impl Action {
    pub fn new(kind: ActionKind, action_goal: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            kind,
            action_goal: action_goal.into(),
            param: param.into(),
        }
    }
}

/// What a trajectory entry records: either an executed action or a loop marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Setup,
    Screenshot,
    Observation,
    Navigate,
    Click,
    Type,
    ScrollDown,
    ScrollUp,
    Look,
    Wait,
    Stopped,
}

impl StepKind {
    pub fn is_action(self) -> bool {
        !matches!(
            self,
            StepKind::Setup | StepKind::Screenshot | StepKind::Observation | StepKind::Stopped
        )
    }
}

impl From<ActionKind> for StepKind {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Navigate => StepKind::Navigate,
            ActionKind::Click => StepKind::Click,
            ActionKind::Type => StepKind::Type,
            ActionKind::ScrollDown => StepKind::ScrollDown,
            ActionKind::ScrollUp => StepKind::ScrollUp,
            ActionKind::Look => StepKind::Look,
            ActionKind::Wait => StepKind::Wait,
        }
    }
}

/// One entry of the run trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_goal: Option<String>,
    pub action: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    pub result: String,
}

impl Step {
    pub fn marker(kind: StepKind, result: impl Into<String>) -> Self {
        Self {
            action_goal: None,
            action: kind,
            param: None,
            result: result.into(),
        }
    }

    pub fn for_action(action: &Action, result: impl Into<String>) -> Self {
        Self {
            action_goal: Some(action.action_goal.clone()),
            action: action.kind.into(),
            param: Some(action.param.clone()),
            result: result.into(),
        }
    }
}

/// An element the observer noticed on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub label: String,
}

/// Structured reading of a page snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub observation: String,
    #[serde(default)]
    pub reflection: String,
    #[serde(default)]
    pub relevant_page_actions: Vec<Interaction>,
}

impl Observation {
    pub fn new(observation: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            ..Default::default()
        }
    }

    /// Placeholder handed downstream when the observe call failed.
    pub fn unavailable() -> Self {
        Self::new(OBSERVATION_FAILED)
    }
}

/// What the reasoning service wants to do after reflecting on progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue { subgoal: String },
    Finished { result: String },
    Break { result: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reflection {
    pub reflection: String,
    pub decision: Decision,
}

impl Reflection {
    pub fn new(reflection: impl Into<String>, decision: Decision) -> Self {
        Self {
            reflection: reflection.into(),
            decision,
        }
    }
}

/// A goal plus the optional extras that are folded into it before the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub goal: String,
    #[serde(default, alias = "secrets")]
    pub credentials: Option<String>,
    #[serde(default, alias = "response_schema")]
    pub schema: Option<Value>,
}

impl RunRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// The goal text every reflect call sees for the whole run.
    pub fn augmented_goal(&self) -> String {
        let mut goal = self.goal.clone();
        if let Some(credentials) = self.credentials.as_deref().filter(|c| !c.is_empty()) {
            goal.push_str("\n\nLogin details (optional):\n");
            goal.push_str(credentials);
        }
        if let Some(schema) = &self.schema {
            let rendered =
                serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
            goal.push_str("\n\nPlease structure the final response according to this schema:\n");
            goal.push_str(&rendered);
        }
        goal
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Finished,
    Break,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub result: Value,
    pub trajectory: Vec<Step>,
    #[serde(rename = "duration_seconds", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl RunResult {
    /// Steps that came from dispatched actions, skipping loop bookkeeping.
    pub fn action_steps(&self) -> impl Iterator<Item = &Step> {
        self.trajectory.iter().filter(|step| step.action.is_action())
    }
}

fn serialize_secs<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(duration.as_secs_f64())
}
