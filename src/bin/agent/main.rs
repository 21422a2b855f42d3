use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use webagent::{AgentConfig, ChromeBrowser, LlmReasoner, WebAgent};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    webagent::init_logging();

    let config = AgentConfig::from_env()?;
    let reasoner = LlmReasoner::from_env()?;
    tracing::info!(headless = config.headless, "Starting web agent server");

    let agent = Arc::new(WebAgent::new(ChromeBrowser::new(), reasoner, config));
    webagent::face::serve(agent).await
}
