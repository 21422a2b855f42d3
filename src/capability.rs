//! The two collaborators the loop drives: a browser and a reasoning service.
//!
//! Both are consumed through traits so the loop can run against Chrome and a
//! hosted model in production, and against scripted fakes in tests.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::types::{Action, Observation, Reflection, Step};

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub headless: bool,
    pub debug_port: Option<u16>,
    pub user_data_dir: Option<PathBuf>,
    pub window_size: Option<(u32, u32)>,
}

/// Visible area of the page plus how far it has been scrolled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

/// Which coordinate system a resolved point is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSpace {
    /// Relative to the top-left of the visible area (pointer moves, wheel).
    Viewport,
    /// Relative to the top of the document (clicks, markers).
    Document,
}

impl Viewport {
    /// Map normalized `[0, 1]` coordinates onto this viewport.
    pub fn denormalize(&self, x: f64, y: f64, space: PointSpace) -> (f64, f64) {
        let px = x.clamp(0.0, 1.0) * self.width;
        let mut py = y.clamp(0.0, 1.0) * self.height;
        if space == PointSpace::Document {
            py += self.scroll_y.abs();
        }
        (px.round(), py.round())
    }
}

#[async_trait]
pub trait Browser: Send + Sync {
    type Session: BrowserSession;

    async fn open_session(&self, options: &SessionOptions) -> Result<Self::Session>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    type Page: Page;

    /// The most recently opened tab; popups and new tabs take over.
    async fn active_page(&self) -> Result<Self::Page>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn url(&self) -> Result<String>;
    /// PNG bytes of the visible area.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    async fn goto(&self, url: &str) -> Result<()>;
    async fn click(&self, x: f64, y: f64) -> Result<()>;
    async fn type_text(&self, text: &str) -> Result<()>;
    async fn press_key(&self, key: &str) -> Result<()>;
    async fn scroll_at(&self, x: f64, y: f64, delta_y: f64) -> Result<()>;
    async fn viewport(&self) -> Result<Viewport>;
    async fn draw_marker(&self, x: f64, y: f64) -> Result<()>;
    async fn visible_text(&self) -> Result<String>;
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Describe what the snapshot shows in light of the prior subgoal.
    async fn observe(
        &self,
        subgoal: Option<&str>,
        trajectory: &[Step],
        snapshot: Option<&Path>,
    ) -> Result<Observation>;

    /// Decide whether to continue, finish or give up.
    async fn reflect(&self, goal: &str, url: &str, trajectory: &[Step]) -> Result<Reflection>;

    /// Pick one action toward the subgoal.
    async fn act(
        &self,
        subgoal: &str,
        url: &str,
        trajectory: &[Step],
        observation: &Observation,
    ) -> Result<Action>;

    /// Shape a free-text answer into a value matching `schema`.
    async fn bake(&self, raw: &str, schema: &Value) -> Result<Value>;

    /// Normalized `(x, y)` in `[0, 1]` of the described element in the snapshot.
    async fn locate(&self, snapshot: &Path, description: &str) -> Result<(f64, f64)>;

    /// Pull the parts of `page_text` relevant to `goal`.
    async fn summarize(&self, goal: &str, page_text: &str) -> Result<String>;
}
