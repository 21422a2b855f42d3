#![allow(dead_code)]

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use webagent::{
    Action, ActionKind, AgentConfig, Browser, BrowserSession, Decision, Observation, Page,
    Reasoner, Reflection, RunHandle, SessionOptions, StatusEntry, Step, Viewport, WebAgent,
};

pub type TestAgent = WebAgent<FakeBrowser, ScriptedReasoner>;

/// Config with no delays and snapshots written into `dir`.
pub fn fast_config(dir: &TempDir) -> AgentConfig {
    AgentConfig {
        settle_delay: Duration::ZERO,
        wait_delay: Duration::ZERO,
        snapshot_dir: dir.path().to_path_buf(),
        ..AgentConfig::default()
    }
}

pub fn files_in(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

pub fn labels(history: &[StatusEntry]) -> Vec<String> {
    history.iter().map(|e| e.action.clone()).collect()
}

pub fn count_label(history: &[StatusEntry], label: &str) -> usize {
    history.iter().filter(|e| e.action == label).count()
}

pub fn continue_with(subgoal: &str) -> Result<Reflection> {
    Ok(Reflection::new(
        "keep going",
        Decision::Continue {
            subgoal: subgoal.to_string(),
        },
    ))
}

pub fn finished(result: &str) -> Result<Reflection> {
    Ok(Reflection::new(
        "goal met",
        Decision::Finished {
            result: result.to_string(),
        },
    ))
}

pub fn give_up(result: &str) -> Result<Reflection> {
    Ok(Reflection::new(
        "stuck",
        Decision::Break {
            result: result.to_string(),
        },
    ))
}

pub fn action(kind: ActionKind, param: &str) -> Action {
    Action::new(kind, "reach the subgoal", param)
}

/// Handle whose observer calls `stop()` the first time `label` is published.
pub fn stop_on(label: &'static str) -> RunHandle {
    let slot: Arc<OnceLock<RunHandle>> = Arc::new(OnceLock::new());
    let target = slot.clone();
    let handle = RunHandle::with_observer(Arc::new(move |entry: &StatusEntry| {
        if entry.action == label
            && let Some(handle) = target.get()
        {
            handle.stop();
        }
    }));
    let _ = slot.set(handle.clone());
    handle
}

#[derive(Clone)]
pub struct FakeBrowser {
    pub fail_open: bool,
    pub fail_page: bool,
    pub page: FakePage,
    pub closed: Arc<AtomicBool>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self {
            fail_open: false,
            fail_page: false,
            page: FakePage::default(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FakeBrowser {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    type Session = FakeSession;

    async fn open_session(&self, _options: &SessionOptions) -> Result<FakeSession> {
        if self.fail_open {
            bail!("chrome binary not found");
        }
        Ok(FakeSession {
            fail_page: self.fail_page,
            page: self.page.clone(),
            closed: self.closed.clone(),
        })
    }
}

pub struct FakeSession {
    fail_page: bool,
    page: FakePage,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Page = FakePage;

    async fn active_page(&self) -> Result<FakePage> {
        if self.fail_page {
            bail!("all tabs were closed");
        }
        Ok(self.page.clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakePage {
    pub log: Arc<Mutex<Vec<String>>>,
    pub url: Arc<Mutex<String>>,
    pub screenshot_fails: bool,
    pub primitives_fail: bool,
    pub viewport: Viewport,
    pub text: String,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            log: Arc::default(),
            url: Arc::new(Mutex::new("about:blank".into())),
            screenshot_fails: false,
            primitives_fail: false,
            viewport: Viewport {
                width: 1000.0,
                height: 800.0,
                scroll_y: 0.0,
            },
            text: "Welcome. Price: 42 EUR".into(),
        }
    }
}

impl FakePage {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.log.lock().unwrap().push(call);
        if self.primitives_fail {
            bail!("element detached");
        }
        Ok(())
    }
}

#[async_trait]
impl Page for FakePage {
    async fn url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        if self.screenshot_fails {
            bail!("target closed");
        }
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.record(format!("goto {url}"))?;
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn click(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("click {x},{y}"))
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(format!("type {text}"))
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(format!("key {key}"))
    }

    async fn scroll_at(&self, x: f64, y: f64, delta_y: f64) -> Result<()> {
        self.record(format!("scroll {x},{y},{delta_y}"))
    }

    async fn viewport(&self) -> Result<Viewport> {
        Ok(self.viewport)
    }

    async fn draw_marker(&self, x: f64, y: f64) -> Result<()> {
        self.log.lock().unwrap().push(format!("marker {x},{y}"));
        Ok(())
    }

    async fn visible_text(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Reasoner that replays queued reflections and actions and records every call.
#[derive(Clone, Default)]
pub struct ScriptedReasoner {
    reflections: Arc<Mutex<VecDeque<Result<Reflection>>>>,
    actions: Arc<Mutex<VecDeque<Action>>>,
    bake_result: Arc<Mutex<Option<std::result::Result<Value, String>>>>,
    pub observe_fails: bool,
    pub act_fails: bool,
    pub locate_point: (f64, f64),
    pub calls: Arc<Mutex<Vec<String>>>,
    pub goals: Arc<Mutex<Vec<String>>>,
    pub observed_snapshots: Arc<Mutex<Vec<Option<bool>>>>,
    pub observed_subgoals: Arc<Mutex<Vec<Option<String>>>>,
    pub act_observations: Arc<Mutex<Vec<String>>>,
    pub located: Arc<Mutex<Vec<String>>>,
}

impl ScriptedReasoner {
    pub fn new(
        reflections: Vec<Result<Reflection>>,
        actions: Vec<Action>,
    ) -> Self {
        Self {
            reflections: Arc::new(Mutex::new(reflections.into())),
            actions: Arc::new(Mutex::new(actions.into())),
            locate_point: (0.5, 0.5),
            ..Self::default()
        }
    }

    pub fn with_bake(self, result: std::result::Result<Value, String>) -> Self {
        *self.bake_result.lock().unwrap() = Some(result);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn observe(
        &self,
        subgoal: Option<&str>,
        _trajectory: &[Step],
        snapshot: Option<&Path>,
    ) -> Result<Observation> {
        self.record("observe");
        self.observed_snapshots
            .lock()
            .unwrap()
            .push(snapshot.map(|p| p.exists()));
        self.observed_subgoals
            .lock()
            .unwrap()
            .push(subgoal.map(String::from));
        if self.observe_fails {
            bail!("vision model unavailable");
        }
        Ok(Observation::new("a page with a login form"))
    }

    async fn reflect(&self, goal: &str, _url: &str, _trajectory: &[Step]) -> Result<Reflection> {
        self.record("reflect");
        self.goals.lock().unwrap().push(goal.to_string());
        self.reflections
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| finished("script exhausted"))
    }

    async fn act(
        &self,
        _subgoal: &str,
        _url: &str,
        _trajectory: &[Step],
        observation: &Observation,
    ) -> Result<Action> {
        self.record("act");
        self.act_observations
            .lock()
            .unwrap()
            .push(observation.observation.clone());
        if self.act_fails {
            bail!("rate limited");
        }
        Ok(self
            .actions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| action(ActionKind::Wait, "")))
    }

    async fn bake(&self, raw: &str, _schema: &Value) -> Result<Value> {
        self.record("bake");
        match self.bake_result.lock().unwrap().clone() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Value::String(raw.to_string())),
        }
    }

    async fn locate(&self, snapshot: &Path, description: &str) -> Result<(f64, f64)> {
        self.record("locate");
        assert!(snapshot.exists(), "snapshot must exist while locating");
        self.located.lock().unwrap().push(description.to_string());
        Ok(self.locate_point)
    }

    async fn summarize(&self, goal: &str, page_text: &str) -> Result<String> {
        self.record("summarize");
        Ok(format!("{goal}: {page_text}"))
    }
}

pub fn snapshot_refs(history: &[StatusEntry]) -> Vec<PathBuf> {
    history
        .iter()
        .filter_map(|e| e.screenshot_ref.as_ref().map(PathBuf::from))
        .collect()
}
