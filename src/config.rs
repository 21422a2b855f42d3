use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_WAIT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_SCROLL_DELTA: f64 = 250.0;
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Knobs for the control loop and the browser session it opens.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub headless: bool,
    pub debug_port: Option<u16>,
    /// Reuse a browser profile directory so logins survive between runs.
    pub user_data_dir: Option<PathBuf>,
    pub window_size: (u32, u32),
    /// Pause after navigate, click and type so the page can react.
    pub settle_delay: Duration,
    pub wait_delay: Duration,
    pub scroll_delta: f64,
    pub observe_window: usize,
    pub reflect_window: usize,
    pub act_window: usize,
    pub max_rounds: Option<usize>,
    pub snapshot_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            headless: true,
            debug_port: None,
            user_data_dir: None,
            window_size: (1280, 720),
            settle_delay: DEFAULT_SETTLE_DELAY,
            wait_delay: DEFAULT_WAIT_DELAY,
            scroll_delta: DEFAULT_SCROLL_DELTA,
            observe_window: 1,
            reflect_window: 10,
            act_window: 3,
            max_rounds: None,
            snapshot_dir: std::env::temp_dir(),
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `WEBAGENT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("WEBAGENT_HEADLESS") {
            config.headless = parse_bool(&v).context("WEBAGENT_HEADLESS")?;
        }
        if let Some(v) = lookup("WEBAGENT_DEBUG_PORT") {
            config.debug_port = Some(v.parse().context("WEBAGENT_DEBUG_PORT")?);
        }
        if let Some(v) = lookup("WEBAGENT_PROFILE_DIR") {
            config.user_data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("WEBAGENT_SETTLE_MS") {
            config.settle_delay = Duration::from_millis(v.parse().context("WEBAGENT_SETTLE_MS")?);
        }
        if let Some(v) = lookup("WEBAGENT_WAIT_MS") {
            config.wait_delay = Duration::from_millis(v.parse().context("WEBAGENT_WAIT_MS")?);
        }
        if let Some(v) = lookup("WEBAGENT_MAX_ROUNDS") {
            config.max_rounds = Some(v.parse().context("WEBAGENT_MAX_ROUNDS")?);
        }
        if let Some(v) = lookup("WEBAGENT_SNAPSHOT_DIR") {
            config.snapshot_dir = PathBuf::from(v);
        }

        Ok(config)
    }

    /// Profile directory used when the caller asks for a persistent session.
    pub fn default_profile_dir() -> Result<PathBuf> {
        let base = dirs::data_local_dir().ok_or_else(|| anyhow!("no local data directory"))?;
        Ok(base.join("webagent").join("profile"))
    }
}

/// Where and how to reach the reasoning service.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY not set in environment"))?;
        let model = lookup("WEBAGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let vision_model = lookup("WEBAGENT_VISION_MODEL").unwrap_or_else(|| model.clone());

        Ok(Self {
            api_key,
            base_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            vision_model,
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}
