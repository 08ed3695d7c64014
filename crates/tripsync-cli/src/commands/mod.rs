//! Command handlers

pub mod config;
pub mod item;
pub mod queue;
pub mod status;
pub mod sync;
pub mod trip;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use tripsync_core::sync::SyncState;
use tripsync_core::{Config, HttpRemote, Identity, RemoteStore, Store, SyncOrchestrator};

/// Pick the acting identity: `--as` first, then the configured one
pub fn resolve_identity(cli_as: Option<&str>, config: &Config) -> Result<Option<Identity>> {
    let Some(raw) = cli_as.or(config.identity.as_deref()) else {
        return Ok(None);
    };
    let identity = Identity::parse(raw).with_context(|| format!("Invalid identity '{}'", raw))?;
    Ok(Some(identity))
}

/// The identity, or an error telling the user how to set one
pub fn require_identity(identity: Option<&Identity>) -> Result<&Identity> {
    match identity {
        Some(identity) => Ok(identity),
        None => bail!(
            "No identity configured. Pass --as <email> or set one with:\n  \
             tripsync config set identity you@example.com"
        ),
    }
}

/// Build the remote client from configuration
pub fn build_remote(config: &Config) -> Result<Arc<dyn RemoteStore>> {
    if !config.sync_enabled {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             tripsync config set sync_enabled true\n  \
             tripsync config set remote_url https://your-server"
        );
    }

    let Some(ref remote_url) = config.remote_url else {
        bail!(
            "Remote URL not configured. Set it with:\n  \
             tripsync config set remote_url https://your-server"
        );
    };

    let remote = HttpRemote::new(remote_url, config.api_token.clone())
        .context("Failed to create remote client")?;
    Ok(Arc::new(remote))
}

/// Wrap the store in an orchestrator with persisted history
pub fn orchestrator(store: Store, remote: Arc<dyn RemoteStore>) -> SyncOrchestrator {
    let config = store.config().clone();
    let state = SyncState::with_path(config.sync_state_path()).unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable sync state: {}", e);
        SyncState::new()
    });
    SyncOrchestrator::new(store, remote, config.sync_policy()).with_state(state)
}

/// Ask a yes/no question on stdin
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}
