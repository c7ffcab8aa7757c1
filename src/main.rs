//! rtm-tail: connects to a workspace and logs every event it receives.
//!
//! Configuration comes from the environment (see
//! [`ClientConfig::from_env`]). Stops on Ctrl-C or when the connection
//! drops.

use anyhow::{Context, anyhow};
use tracing_subscriber::EnvFilter;

use workspace_rtm::rtm::EventFilter;
use workspace_rtm::{ClientConfig, ConnectionState, RtmClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ClientConfig::from_env().map_err(|e| anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(api = %config.api_base_url, "starting rtm-tail");

    let client = RtmClient::from_config(&config)?;
    let mut events = client.subscribe(EventFilter::all());
    let mut state = client.watch_state();

    client.connect().await.context("connect failed")?;

    let team = client.team()?;
    let me = client.self_user()?;
    tracing::info!(
        team = %team.name,
        user = %me.username,
        users = client.users()?.len(),
        channels = client.channels()?.len(),
        groups = client.groups()?.len(),
        "connected"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("interrupted");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disconnected {
                    tracing::warn!("connection lost");
                    break;
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let frame = serde_json::to_string(&event)?;
                tracing::info!(event_type = event.event_type(), %frame, "event");
            }
        }
    }

    if client.is_connected() {
        client.disconnect()?;
    }
    Ok(())
}
