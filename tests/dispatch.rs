mod support;

use support::*;
use tempfile::TempDir;
use webagent::{ActionKind, RunHandle, RunRequest, RunResult, Step, StepKind, Viewport, WebAgent};

const CENTER: (f64, f64) = (0.5, 0.5);

/// One continue round dispatching `kind`/`param`, then finish.
async fn single_action(
    browser: &FakeBrowser,
    locate_point: (f64, f64),
    kind: ActionKind,
    param: &str,
) -> (RunResult, RunHandle) {
    let dir = TempDir::new().unwrap();
    let mut reasoner = ScriptedReasoner::new(
        vec![continue_with("do the thing"), finished("done")],
        vec![action(kind, param)],
    );
    reasoner.locate_point = locate_point;
    let handle = RunHandle::new();
    let result = WebAgent::new(browser.clone(), reasoner, fast_config(&dir))
        .run(RunRequest::new("Do the thing"), &handle)
        .await
        .unwrap();
    (result, handle)
}

fn only_action(result: &RunResult) -> &Step {
    let actions: Vec<&Step> = result.action_steps().collect();
    assert_eq!(actions.len(), 1);
    actions[0]
}

#[tokio::test]
async fn type_presses_enter_then_tab() {
    let browser = FakeBrowser::default();
    let (result, handle) = single_action(&browser, CENTER, ActionKind::Type, "hello").await;

    let step = only_action(&result);
    assert_eq!(step.action, StepKind::Type);
    assert_eq!(step.param.as_deref(), Some("hello"));
    assert_eq!(step.result, "Typed: hello");
    assert_eq!(browser.page.calls(), ["type hello", "key Enter", "key Tab"]);
    assert_eq!(count_label(&handle.history(), "typing"), 1);
}

#[tokio::test]
async fn click_adds_scroll_offset_and_marks_the_point() {
    let mut browser = FakeBrowser::default();
    browser.page.viewport = Viewport {
        width: 1000.0,
        height: 800.0,
        scroll_y: 300.0,
    };
    let (result, handle) =
        single_action(&browser, (0.5, 0.25), ActionKind::Click, "Sign in button").await;

    let step = only_action(&result);
    assert_eq!(step.result, "Clicked at (500, 500)");
    assert_eq!(browser.page.calls(), ["marker 500,500", "click 500,500"]);
    assert_eq!(count_label(&handle.history(), "clicking"), 1);
}

#[tokio::test]
async fn scroll_up_uses_viewport_point_and_negative_delta() {
    let mut browser = FakeBrowser::default();
    browser.page.viewport.scroll_y = 300.0;

    let (result, _) = single_action(&browser, CENTER, ActionKind::ScrollUp, "results list").await;

    assert_eq!(only_action(&result).result, "Scrolled up at (500, 400)");
    assert_eq!(browser.page.calls(), ["scroll 500,400,-250"]);
}

#[tokio::test]
async fn scroll_down_is_positive() {
    let browser = FakeBrowser::default();
    let (result, _) = single_action(&browser, CENTER, ActionKind::ScrollDown, "page").await;

    assert_eq!(only_action(&result).result, "Scrolled down at (500, 400)");
    assert_eq!(browser.page.calls(), ["scroll 500,400,250"]);
}

#[tokio::test]
async fn look_summarizes_visible_text() {
    let browser = FakeBrowser::default();
    let (result, handle) = single_action(&browser, CENTER, ActionKind::Look, "").await;

    assert_eq!(
        only_action(&result).result,
        "reach the subgoal: Welcome. Price: 42 EUR"
    );
    assert_eq!(count_label(&handle.history(), "looking"), 1);
}

#[tokio::test]
async fn primitive_failure_becomes_step_result() {
    let mut browser = FakeBrowser::default();
    browser.page.primitives_fail = true;

    let (result, _) =
        single_action(&browser, CENTER, ActionKind::Navigate, "https://example.com").await;

    assert_eq!(result.status, webagent::RunStatus::Finished);
    let step = only_action(&result);
    assert_eq!(step.action, StepKind::Navigate);
    assert!(step.result.starts_with("Navigation failed:"));
    assert!(step.result.contains("element detached"));
}

#[tokio::test]
async fn wait_reports_configured_delay() {
    let browser = FakeBrowser::default();
    let (result, handle) = single_action(&browser, CENTER, ActionKind::Wait, "").await;

    assert_eq!(only_action(&result).result, "Waited 0 seconds");
    let history = handle.history();
    let waiting: Vec<_> = history.iter().filter(|e| e.action == "waiting").collect();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].details.as_deref(), Some("Waiting for 0 seconds"));
}
