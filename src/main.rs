//! Jira Assistant - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the chat API.

use jira_assistant::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the process environment still applies
    let dotenv = dotenvy::dotenv();

    let config = Config::from_env()?;

    let default_filter = if config.debug {
        "jira_assistant=debug,tower_http=debug"
    } else {
        "jira_assistant=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }
    info!(
        "Loaded configuration: provider={}, model={}, jira={}",
        config.llm.provider, config.llm.model, config.jira.server_url
    );

    api::serve(config).await?;

    Ok(())
}
