//! Turns one chosen action into one browser primitive, one trajectory step and
//! one status update. Primitive failures become the step's result text.

use anyhow::{Result, anyhow};
use std::path::Path;
use tracing::warn;

use crate::capability::{Page, PointSpace, Reasoner};
use crate::config::AgentConfig;
use crate::status::{Activity, StatusChannel};
use crate::trajectory::Trajectory;
use crate::types::{Action, ActionKind, Step};

pub(crate) struct Dispatcher<'a, P, R> {
    pub page: &'a P,
    pub reasoner: &'a R,
    pub status: &'a StatusChannel,
    pub trajectory: &'a Trajectory,
    pub config: &'a AgentConfig,
    pub snapshot: Option<&'a Path>,
}

impl<P: Page, R: Reasoner> Dispatcher<'_, P, R> {
    pub async fn dispatch(&self, action: &Action) {
        let result = match action.kind {
            ActionKind::Navigate => {
                self.publish(Activity::Navigating, format!("Going to {}", action.param));
                let outcome = match self.page.goto(&action.param).await {
                    Ok(()) => format!("Navigated to {}", action.param),
                    Err(e) => format!("Navigation failed: {e:#}"),
                };
                self.settle().await;
                outcome
            }
            ActionKind::Click => {
                self.publish(
                    Activity::Clicking,
                    format!("Finding and clicking {}", action.param),
                );
                let outcome = match self.click(&action.param).await {
                    Ok((x, y)) => format!("Clicked at ({x}, {y})"),
                    Err(e) => format!("Clicking failed: {e:#}"),
                };
                self.settle().await;
                outcome
            }
            ActionKind::Type => {
                self.publish(Activity::Typing, format!("Entering text: {}", action.param));
                let outcome = match self.type_and_submit(&action.param).await {
                    Ok(()) => format!("Typed: {}", action.param),
                    Err(e) => format!("Typing failed: {e:#}"),
                };
                self.settle().await;
                outcome
            }
            ActionKind::ScrollDown | ActionKind::ScrollUp => {
                let (direction, delta) = if action.kind == ActionKind::ScrollDown {
                    ("down", self.config.scroll_delta)
                } else {
                    ("up", -self.config.scroll_delta)
                };
                self.publish(Activity::Scrolling, format!("Scrolling {direction}"));
                match self.scroll(&action.param, delta).await {
                    Ok((x, y)) => format!("Scrolled {direction} at ({x}, {y})"),
                    Err(e) => format!("Scrolling {direction} failed: {e:#}"),
                }
            }
            ActionKind::Look => {
                self.publish(Activity::Looking, action.action_goal.clone());
                match self.look(&action.action_goal).await {
                    Ok(summary) => summary,
                    Err(e) => format!("Looking failed: {e:#}"),
                }
            }
            ActionKind::Wait => {
                let secs = self.config.wait_delay.as_secs();
                self.publish(Activity::Waiting, format!("Waiting for {secs} seconds"));
                tokio::time::sleep(self.config.wait_delay).await;
                format!("Waited {secs} seconds")
            }
        };

        self.trajectory.push(Step::for_action(action, result));
    }

    fn publish(&self, activity: Activity, details: String) {
        self.status.update(activity, Some(details), self.snapshot);
    }

    async fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }

    async fn click(&self, target: &str) -> Result<(f64, f64)> {
        let (x, y) = self
            .resolve_point(&format!("click {target}"), PointSpace::Document)
            .await?;
        if let Err(e) = self.page.draw_marker(x, y).await {
            warn!(error = %e, "could not draw click marker");
        }
        self.page.click(x, y).await?;
        Ok((x, y))
    }

    async fn type_and_submit(&self, text: &str) -> Result<()> {
        self.page.type_text(text).await?;
        self.page.press_key("Enter").await?;
        self.page.press_key("Tab").await?;
        Ok(())
    }

    async fn scroll(&self, anchor: &str, delta: f64) -> Result<(f64, f64)> {
        let (x, y) = self
            .resolve_point(&format!("scroll {anchor}"), PointSpace::Viewport)
            .await?;
        self.page.scroll_at(x, y, delta).await?;
        Ok((x, y))
    }

    async fn look(&self, goal: &str) -> Result<String> {
        let text = self.page.visible_text().await?;
        self.reasoner.summarize(goal, &text).await
    }

    /// Snapshot description to page pixels. The only place coordinates change space.
    async fn resolve_point(&self, description: &str, space: PointSpace) -> Result<(f64, f64)> {
        let snapshot = self
            .snapshot
            .ok_or_else(|| anyhow!("no snapshot available to locate '{description}'"))?;
        let (nx, ny) = self.reasoner.locate(snapshot, description).await?;
        let viewport = self.page.viewport().await?;
        Ok(viewport.denormalize(nx, ny, space))
    }
}
