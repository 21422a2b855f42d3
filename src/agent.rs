//! The control loop: open a session, run observe → reflect → act rounds until
//! the reasoning service finishes or gives up, or the caller stops the run.

use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capability::{Browser, BrowserSession, Page, Reasoner, SessionOptions};
use crate::config::AgentConfig;
use crate::dispatch::Dispatcher;
use crate::error::{AgentError, Result};
use crate::handle::RunHandle;
use crate::snapshot::SnapshotSet;
use crate::status::{Activity, StatusObserver};
use crate::types::{
    Decision, Observation, RunRequest, RunResult, RunStatus, STOPPED_BY_USER, Step, StepKind,
};

/// Outcome of a single round.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    Continue { subgoal: String },
    Finished(Value),
    Break(Value),
}

pub struct WebAgent<B, R> {
    browser: B,
    reasoner: R,
    config: AgentConfig,
}

impl<B: Browser, R: Reasoner> WebAgent<B, R> {
    pub fn new(browser: B, reasoner: R, config: AgentConfig) -> Self {
        Self {
            browser,
            reasoner,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Drive one goal to a terminal state. Cleanup runs on every path before
    /// this returns, including errors.
    pub async fn run(&self, request: RunRequest, handle: &RunHandle) -> Result<RunResult> {
        handle.claim()?;
        let started = Instant::now();
        let status = handle.status();
        let run_id = handle.id();

        info!(run = %run_id, goal = %request.goal, "starting run");
        status.update(Activity::Starting, Some(request.goal.clone()), None);

        let goal = request.augmented_goal();
        let mut snapshots = SnapshotSet::new(&self.config.snapshot_dir);

        status.update(Activity::Setup, Some("Initializing browser".into()), None);
        let session = match self.browser.open_session(&self.session_options()).await {
            Ok(session) => session,
            Err(e) => {
                let err = AgentError::Session(e);
                status.update(Activity::Error, Some(err.to_string()), None);
                self.teardown(handle, None::<&B::Session>, &mut snapshots).await;
                return Err(err);
            }
        };
        handle.steps().push(Step::marker(
            StepKind::Setup,
            "Opened up an empty browser window",
        ));

        let outcome = self
            .drive(&session, &goal, request.schema.as_ref(), handle, &mut snapshots)
            .await;

        if let Err(e) = &outcome {
            warn!(run = %run_id, error = %e, "run failed");
            status.update(Activity::Error, Some(e.to_string()), None);
        }
        self.teardown(handle, Some(&session), &mut snapshots).await;

        let (run_status, result) = outcome?;
        let duration = started.elapsed();
        info!(run = %run_id, status = ?run_status, elapsed = ?duration, "run complete");

        Ok(RunResult {
            status: run_status,
            result,
            trajectory: handle.trajectory(),
            duration,
        })
    }

    async fn drive(
        &self,
        session: &B::Session,
        goal: &str,
        schema: Option<&Value>,
        handle: &RunHandle,
        snapshots: &mut SnapshotSet,
    ) -> Result<(RunStatus, Value)> {
        let mut subgoal: Option<String> = None;
        let mut rounds = 0usize;

        while !handle.is_stopped() {
            if let Some(limit) = self.config.max_rounds
                && rounds >= limit
            {
                let message = format!("Reached maximum round limit ({limit})");
                warn!(run = %handle.id(), limit, "round limit reached");
                handle
                    .status()
                    .update(Activity::Breaking, Some(message.clone()), None);
                return Ok((RunStatus::Break, Value::String(message)));
            }
            rounds += 1;
            info!(run = %handle.id(), round = rounds, "round");

            match self
                .round(session, goal, subgoal.as_deref(), handle, schema, snapshots)
                .await?
            {
                RoundOutcome::Continue { subgoal: next } => subgoal = Some(next),
                RoundOutcome::Finished(result) => return Ok((RunStatus::Finished, result)),
                RoundOutcome::Break(result) => return Ok((RunStatus::Break, result)),
            }
        }

        handle
            .steps()
            .push(Step::marker(StepKind::Stopped, STOPPED_BY_USER));
        handle
            .status()
            .update(Activity::Stopped, Some(STOPPED_BY_USER.into()), None);
        Ok((RunStatus::Stopped, Value::String(STOPPED_BY_USER.into())))
    }

    async fn round(
        &self,
        session: &B::Session,
        goal: &str,
        prior_subgoal: Option<&str>,
        handle: &RunHandle,
        schema: Option<&Value>,
        snapshots: &mut SnapshotSet,
    ) -> Result<RoundOutcome> {
        let status = handle.status();
        let trajectory = handle.steps();
        let page = session.active_page().await.map_err(AgentError::Browser)?;

        let snapshot = self.capture(&page, snapshots).await.map_or_else(
            |e| {
                warn!(error = %e, "snapshot failed");
                trajectory.push(Step::marker(StepKind::Screenshot, format!("Failed: {e:#}")));
                None
            },
            Some,
        );
        let snapshot = snapshot.as_deref();

        let observation = match self
            .reasoner
            .observe(
                prior_subgoal,
                &trajectory.recent(self.config.observe_window),
                snapshot,
            )
            .await
        {
            Ok(observation) => observation,
            Err(e) => {
                warn!(error = %e, "observe failed");
                Observation::unavailable()
            }
        };
        trajectory.push(Step::marker(
            StepKind::Observation,
            observation.observation.clone(),
        ));

        let url = page.url().await.unwrap_or_else(|_| "unknown".into());
        let reflection = self
            .reasoner
            .reflect(goal, &url, &trajectory.recent(self.config.reflect_window))
            .await
            .map_err(|e| AgentError::reasoning("reflect", e))?;
        status.update(
            Activity::Reflection,
            Some(reflection.reflection.clone()),
            snapshot,
        );

        match reflection.decision {
            Decision::Finished { result } => {
                status.update(Activity::FinishingUp, Some(result.clone()), snapshot);
                Ok(RoundOutcome::Finished(self.finalize(result, schema).await))
            }
            Decision::Break { result } => {
                status.update(Activity::Breaking, Some(result.clone()), snapshot);
                Ok(RoundOutcome::Break(self.finalize(result, schema).await))
            }
            Decision::Continue { subgoal } => {
                let action = self
                    .reasoner
                    .act(
                        &subgoal,
                        &url,
                        &trajectory.recent(self.config.act_window),
                        &observation,
                    )
                    .await
                    .map_err(|e| AgentError::reasoning("act", e))?;
                info!(action = ?action.kind, param = %action.param, "dispatching");

                Dispatcher {
                    page: &page,
                    reasoner: &self.reasoner,
                    status,
                    trajectory,
                    config: &self.config,
                    snapshot,
                }
                .dispatch(&action)
                .await;
                Ok(RoundOutcome::Continue { subgoal })
            }
        }
    }

    async fn capture(
        &self,
        page: &<B::Session as BrowserSession>::Page,
        snapshots: &mut SnapshotSet,
    ) -> anyhow::Result<PathBuf> {
        let png = page.screenshot().await?;
        snapshots.store(&png)
    }

    /// Bake `raw` against `schema` when one was given. A bake failure keeps the
    /// raw answer next to the validation error instead of failing the run.
    async fn finalize(&self, raw: String, schema: Option<&Value>) -> Value {
        let Some(schema) = schema else {
            return Value::String(raw);
        };
        match self.reasoner.bake(&raw, schema).await {
            Ok(baked) => baked,
            Err(e) => {
                warn!(error = %e, "response did not match schema");
                json!({
                    "error": "Failed to validate response against schema",
                    "original_response": raw,
                    "validation_error": format!("{e:#}"),
                })
            }
        }
    }

    async fn teardown(
        &self,
        handle: &RunHandle,
        session: Option<&B::Session>,
        snapshots: &mut SnapshotSet,
    ) {
        let status = handle.status();
        status.update(
            Activity::Cleanup,
            Some("Done with task, closing browser".into()),
            None,
        );
        if let Some(session) = session
            && let Err(e) = session.close().await
        {
            warn!(run = %handle.id(), error = %e, "error closing browser session");
        }
        let removed = snapshots.purge();
        tracing::debug!(run = %handle.id(), removed, "snapshots purged");
        status.update(Activity::Idle, None, None);
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            headless: self.config.headless,
            debug_port: self.config.debug_port,
            user_data_dir: self.config.user_data_dir.clone(),
            window_size: Some(self.config.window_size),
        }
    }
}

impl<B, R> WebAgent<B, R>
where
    B: Browser + 'static,
    R: Reasoner + 'static,
{
    /// Start a run on the tokio runtime and hand back its handle right away.
    pub fn spawn(
        self: &Arc<Self>,
        request: RunRequest,
        observer: Option<StatusObserver>,
    ) -> (RunHandle, JoinHandle<Result<RunResult>>) {
        let handle = match observer {
            Some(observer) => RunHandle::with_observer(observer),
            None => RunHandle::new(),
        };
        let agent = Arc::clone(self);
        let task_handle = handle.clone();
        let task = tokio::spawn(async move { agent.run(request, &task_handle).await });
        (handle, task)
    }
}

/// Waits for a spawned run, folding a panicked task into an error.
pub async fn join_run(task: JoinHandle<Result<RunResult>>) -> Result<RunResult> {
    task.await
        .map_err(|e| AgentError::Aborted(e.to_string()))?
}
