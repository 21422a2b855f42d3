//! Chrome-backed browser capability built on `headless_chrome`.
//!
//! `headless_chrome` is a blocking API, so every call runs on tokio's
//! blocking pool.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::protocol::cdp::Page as Cdp;
use headless_chrome::{Browser as Chrome, LaunchOptions, Tab};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use crate::capability::{Browser, BrowserSession, Page, SessionOptions, Viewport};
use crate::dom;

/// Launches one Chrome process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromeBrowser;

impl ChromeBrowser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    type Session = ChromeSession;

    async fn open_session(&self, options: &SessionOptions) -> Result<ChromeSession> {
        let options = options.clone();
        blocking(move || ChromeSession::launch(&options)).await
    }
}

pub struct ChromeSession {
    browser: Arc<Mutex<Option<Chrome>>>,
}

impl ChromeSession {
    fn launch(options: &SessionOptions) -> Result<Self> {
        if let Some(dir) = &options.user_data_dir {
            std::fs::create_dir_all(dir)?;
            info!(profile = %dir.display(), "using persistent browser profile");
        }

        let args = extra_args();
        info!(headless = options.headless, "launching Chrome");
        let browser = Chrome::new(launch_options(options, &args)).map_err(|e| anyhow!("Browser launch failed: {e}"))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        debug!("Chrome ready");

        Ok(Self {
            browser: Arc::new(Mutex::new(Some(browser))),
        })
    }

    /// Most recently opened tab, or a fresh one if the browser has none.
    fn latest_tab(browser: &Mutex<Option<Chrome>>) -> Result<Arc<Tab>> {
        let guard = browser.lock().unwrap_or_else(PoisonError::into_inner);
        let browser = guard
            .as_ref()
            .ok_or_else(|| anyhow!("browser session already closed"))?;

        let latest = {
            let tabs = browser
                .get_tabs()
                .lock()
                .map_err(|_| anyhow!("tab list lock poisoned"))?;
            tabs.last().cloned()
        };
        match latest {
            Some(tab) => Ok(tab),
            None => Ok(browser.new_tab()?),
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    type Page = ChromePage;

    async fn active_page(&self) -> Result<ChromePage> {
        let browser = self.browser.clone();
        let tab = blocking(move || Self::latest_tab(&browser)).await?;
        Ok(ChromePage { tab })
    }

    async fn close(&self) -> Result<()> {
        let browser = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(browser) = browser {
            // Dropping the handle kills the Chrome process we launched.
            blocking(move || {
                drop(browser);
                Ok(())
            })
            .await?;
            info!("Chrome closed");
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn with_tab<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Tab>) -> Result<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        blocking(move || f(&tab)).await
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn url(&self) -> Result<String> {
        self.with_tab(|tab| Ok(tab.get_url())).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with_tab(|tab| {
            tab.capture_screenshot(Cdp::CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn click(&self, x: f64, y: f64) -> Result<()> {
        self.with_tab(move |tab| {
            tab.click_point(Point { x, y })?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        self.with_tab(move |tab| {
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_tab(move |tab| {
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn scroll_at(&self, x: f64, y: f64, delta_y: f64) -> Result<()> {
        self.with_tab(move |tab| {
            tab.move_mouse_to_point(Point { x, y })?;
            dom::scroll_at(tab, x, y, delta_y)
        })
        .await
    }

    async fn viewport(&self) -> Result<Viewport> {
        self.with_tab(dom::read_viewport).await
    }

    async fn draw_marker(&self, x: f64, y: f64) -> Result<()> {
        self.with_tab(move |tab| dom::draw_marker(tab, x, y)).await
    }

    async fn visible_text(&self) -> Result<String> {
        self.with_tab(dom::visible_text).await
    }
}

fn extra_args() -> Vec<OsString> {
    vec![
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--disable-blink-features=AutomationControlled".into(),
        "--password-store=basic".into(),
    ]
}

/// The debug port goes through `port`; headless_chrome adds its own
/// `--remote-debugging-port` switch from it.
fn launch_options<'a>(options: &SessionOptions, args: &'a [OsString]) -> LaunchOptions<'a> {
    LaunchOptions {
        headless: options.headless,
        window_size: options.window_size,
        user_data_dir: options.user_data_dir.clone(),
        port: options.debug_port,
        args: args.iter().map(|a| a.as_os_str()).collect(),
        idle_browser_timeout: Duration::from_secs(300),
        ..Default::default()
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("browser task panicked: {e}"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn debug_port_is_passed_once_through_launch_options() {
        let options = SessionOptions {
            headless: true,
            debug_port: Some(9222),
            user_data_dir: Some(PathBuf::from("/tmp/webagent-profile")),
            window_size: Some((1280, 800)),
        };
        let args = extra_args();
        let launch = launch_options(&options, &args);

        assert_eq!(launch.port, Some(9222));
        assert!(launch.headless);
        assert_eq!(launch.window_size, Some((1280, 800)));
        assert!(
            launch
                .args
                .iter()
                .all(|a| !a.to_string_lossy().contains("remote-debugging-port"))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn active_page_on_closed_session_fails() {
        let session = ChromeSession {
            browser: Arc::new(Mutex::new(None)),
        };
        let err = session.active_page().await.err().unwrap();
        assert!(err.to_string().contains("already closed"));
        session.close().await.unwrap();
    }
}
