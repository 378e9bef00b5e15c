mod command;
mod config;
mod dispatcher;
mod issues;
mod platform;
mod runner;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::platform::mattermost::{self, MattermostClient};
use crate::platform::post_best_effort;
use crate::session::BotSession;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,runbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Both reqwest and the websocket use rustls; pin it to ring
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Server: {}", config.mattermost.url);
    info!("  Command channel: {}/{}", config.mattermost.team, config.mattermost.channel);
    info!(
        "  Executable: {} (args: {})",
        config.command.executable.display(),
        config.command.args
    );

    let started_at = Local::now();
    let client = Arc::new(MattermostClient::new(&config.mattermost));

    client.ping().await?;
    let me = client.me().await.context("Failed to fetch the bot user")?;
    info!("Logged in as {}", me.username);
    let team = client.team_by_name(&config.mattermost.team).await?;
    let channel = client
        .channel_by_name(&team.id, &config.mattermost.channel)
        .await?;
    info!("Attached to channel {} in team {}", channel.name, team.name);

    let ws_url = config.websocket_url();
    let token = config.mattermost.token.clone();
    let session = Arc::new(BotSession::new(
        config, me.id, me.username, channel.id, started_at,
    ));
    let dispatcher = Arc::new(Dispatcher::new(session.clone(), client.clone())?);

    let (tx, mut rx) = mpsc::channel(64);
    let listener = tokio::spawn(async move {
        if let Err(e) = mattermost::listen(&ws_url, &token, tx).await {
            error!("Event stream failed: {:#}", e);
        }
    });

    post_best_effort(
        client.as_ref(),
        &session.channel_id,
        &session.connected_message(),
        None,
    )
    .await;

    info!("Bot is running");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    error!("Event stream closed");
                    break;
                };
                if let Some(invocation) = dispatcher.route(&event).await {
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        dispatcher.execute(invocation).await;
                    });
                }
            }
        }
    }

    post_best_effort(
        client.as_ref(),
        &session.channel_id,
        &session.disconnected_message(),
        None,
    )
    .await;
    listener.abort();
    info!("Shutdown");

    Ok(())
}
