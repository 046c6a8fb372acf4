//! Herald CLI: follow a server-sent event stream from the terminal.

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::StreamExt;
use herald_client::EventSource;
use herald_config::{CliOverrides, HeraldConfig};
use herald_types::{ERROR_CHANNEL, MESSAGE_TYPE, Notification, OPEN_CHANNEL, ReadyState};
use std::io::{self, Write};

#[derive(Parser)]
#[command(name = "herald", version, about = "Follow a server-sent event stream")]
struct Cli {
    /// Stream URL (overrides HERALD_URL and the config file)
    url: Option<String>,

    /// Send credentials with cross-origin requests
    #[arg(long)]
    with_credentials: bool,

    /// Base reconnection delay in milliseconds
    #[arg(long)]
    reconnection_time_ms: Option<u64>,

    /// Print one JSON object per notification
    #[arg(long)]
    json: bool,

    /// Also listen for this named event type (repeatable)
    #[arg(long = "event", value_name = "NAME")]
    events: Vec<String>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = HeraldConfig::load(CliOverrides {
        url: cli.url,
        with_credentials: cli.with_credentials.then_some(true),
        reconnection_time_ms: cli.reconnection_time_ms,
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let builder = EventSource::builder(config.url.as_str())
        .with_credentials(config.with_credentials)
        .config(config.client);
    let mut stream = builder.notifications(channels(&cli.events));
    let source = builder
        .connect()
        .with_context(|| format!("Failed to open {}", config.url))?;

    tracing::info!(url = %source.url(), "Listening");

    let mut stdout = io::stdout().lock();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                source.close();
                return Ok(());
            }
            next = stream.next() => {
                let Some(notification) = next else { break };
                writeln!(stdout, "{}", render(&notification, source.ready_state(), cli.json))?;
                stdout.flush()?;
            }
        }
    }

    if source.has_failed() {
        bail!("{} closed after a fatal error", source.url());
    }
    Ok(())
}

/// Channels to listen on: the standard three plus any named event types.
fn channels(extra: &[String]) -> Vec<String> {
    let mut channels: Vec<String> = [OPEN_CHANNEL, MESSAGE_TYPE, ERROR_CHANNEL]
        .iter()
        .map(|c| c.to_string())
        .collect();
    for name in extra {
        if !channels.contains(name) {
            channels.push(name.clone());
        }
    }
    channels
}

fn render(notification: &Notification, state: ReadyState, json: bool) -> String {
    if json {
        return render_json(notification, state).to_string();
    }
    match notification {
        Notification::Open => "open".to_string(),
        Notification::Message(event) => format!("message {}: {}", event.event_type(), event.data()),
        Notification::Error { message } => format!("error: {message}"),
    }
}

fn render_json(notification: &Notification, state: ReadyState) -> serde_json::Value {
    let channel = notification.channel();
    match notification {
        Notification::Open => serde_json::json!({ "channel": channel }),
        Notification::Message(event) => serde_json::json!({
            "channel": channel,
            "type": event.event_type(),
            "data": event.data(),
            "origin": event.origin(),
        }),
        Notification::Error { message } => serde_json::json!({
            "channel": channel,
            "message": message,
            "readyState": state,
        }),
    }
}
