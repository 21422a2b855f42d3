use anyhow::{Context, Result};
use headless_chrome::Tab;
use std::sync::Arc;

use crate::capability::Viewport;

pub const PAGE_TEXT_MAX_CHARS: usize = 20_000;

/// Size of the visible area and the current vertical scroll, as a JSON string.
const VIEWPORT_JS: &str = r#"
(() => {
  const root = document.documentElement.getBoundingClientRect();
  return JSON.stringify({
    width: window.innerWidth,
    height: window.innerHeight,
    scroll_y: Math.abs(root.top)
  });
})()
"#;

const TEXT_JS: &str = "document.body ? document.body.innerText : ''";

/// Wheel-scrolls whatever element sits under the pointer, falling back to the window.
fn scroll_js(x: f64, y: f64, delta_y: f64) -> String {
    format!(
        r#"
(() => {{
  let el = document.elementFromPoint({x}, {y});
  while (el && el !== document.body) {{
    const style = getComputedStyle(el);
    if (/(auto|scroll)/.test(style.overflowY) && el.scrollHeight > el.clientHeight) {{
      el.scrollBy(0, {delta_y});
      return true;
    }}
    el = el.parentElement;
  }}
  window.scrollBy(0, {delta_y});
  return true;
}})()
"#
    )
}

/// Semi-transparent dot at document coordinates, removed after 2.5s.
fn marker_js(x: f64, y: f64) -> String {
    format!(
        r#"
(() => {{
  const dot = document.createElement('div');
  Object.assign(dot.style, {{
    position: 'absolute', left: '{x}px', top: '{y}px',
    width: '25px', height: '25px', borderRadius: '50%',
    backgroundColor: 'blue', opacity: '0.5', pointerEvents: 'none',
    transform: 'translate(-50%, -50%)', zIndex: '9999'
  }});
  document.body.appendChild(dot);
  setTimeout(() => dot.remove(), 2500);
}})()
"#
    )
}

fn eval_string(tab: &Arc<Tab>, js: &str) -> Result<String> {
    let result = tab.evaluate(js, false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default())
}

pub fn read_viewport(tab: &Arc<Tab>) -> Result<Viewport> {
    let raw = eval_string(tab, VIEWPORT_JS)?;
    serde_json::from_str(&raw).with_context(|| format!("unexpected viewport payload: {raw}"))
}

pub fn visible_text(tab: &Arc<Tab>) -> Result<String> {
    let raw = eval_string(tab, TEXT_JS)?;
    Ok(truncate_chars(&raw, PAGE_TEXT_MAX_CHARS))
}

pub fn scroll_at(tab: &Arc<Tab>, x: f64, y: f64, delta_y: f64) -> Result<()> {
    tab.evaluate(&scroll_js(x, y, delta_y), false)?;
    Ok(())
}

pub fn draw_marker(tab: &Arc<Tab>, x: f64, y: f64) -> Result<()> {
    tab.evaluate(&marker_js(x, y), false)?;
    Ok(())
}

fn truncate_chars(raw: &str, max: usize) -> String {
    match raw.char_indices().nth(max) {
        Some((cut, _)) => format!(
            "{}\n... [truncated, {} total chars]",
            &raw[..cut],
            raw.chars().count()
        ),
        None => raw.to_string(),
    }
}
