use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use webagent::{
    AgentConfig, ChromeBrowser, LlmReasoner, RunRequest, StatusEntry, StatusObserver, WebAgent,
    join_run,
};

/// Drive a browser toward a goal from the terminal.
#[derive(Debug, Parser)]
#[command(name = "webagent", version)]
struct Cli {
    /// What the agent should accomplish.
    goal: String,

    /// Login details handed to the agent as part of the goal.
    #[arg(long)]
    secrets: Option<String>,

    /// JSON schema file the final answer should be shaped into.
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    headful: bool,

    #[arg(long)]
    debug_port: Option<u16>,

    /// Keep cookies and logins between runs.
    #[arg(long)]
    persist_profile: bool,

    #[arg(long)]
    max_rounds: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    webagent::init_logging();
    let cli = Cli::parse();

    let mut config = AgentConfig::from_env()?;
    if cli.headful {
        config.headless = false;
    }
    if cli.debug_port.is_some() {
        config.debug_port = cli.debug_port;
    }
    if cli.persist_profile {
        config.user_data_dir = Some(AgentConfig::default_profile_dir()?);
    }
    if cli.max_rounds.is_some() {
        config.max_rounds = cli.max_rounds;
    }

    let mut request = RunRequest::new(&cli.goal);
    if let Some(secrets) = cli.secrets {
        request = request.with_credentials(secrets);
    }
    if let Some(path) = &cli.schema {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading schema {}", path.display()))?;
        request = request.with_schema(serde_json::from_str(&raw).context("parsing schema")?);
    }

    let agent = Arc::new(WebAgent::new(
        ChromeBrowser::new(),
        LlmReasoner::from_env()?,
        config,
    ));
    let printer: StatusObserver = Arc::new(|entry: &StatusEntry| match &entry.details {
        Some(details) => eprintln!("[{}] {}", entry.action, details),
        None => eprintln!("[{}]", entry.action),
    });
    let (handle, task) = agent.spawn(request, Some(printer));

    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping after the current round...");
            stopper.stop();
        }
    });

    let result = join_run(task).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
