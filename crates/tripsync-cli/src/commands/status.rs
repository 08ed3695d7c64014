//! Status command handler

use anyhow::Result;

use tripsync_core::sync::SyncState;
use tripsync_core::Store;

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let config = store.config();
    let counts = store.counts()?;
    let queue = store.queue_status(config.retry_ceiling)?;
    let history = SyncState::with_path(config.sync_state_path())
        .map(|state| state.history())
        .unwrap_or_default();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "identity": config.identity,
                    "sync_enabled": config.sync_enabled,
                    "remote_url": config.remote_url,
                    "data_dir": config.data_dir,
                    "counts": counts,
                    "queue": queue,
                    "history": history
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", queue.total);
        }
        OutputFormat::Human => {
            println!("Tripsync Status");
            println!("===============");
            println!();
            println!(
                "Identity: {}",
                config.identity.as_deref().unwrap_or("(not set)")
            );
            println!();
            println!("Sync:");
            println!(
                "  Status: {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(ref url) = config.remote_url {
                println!("  Remote: {}", url);
            }
            match (history.last_push_at, history.last_push) {
                (Some(at), Some(push)) => println!(
                    "  Last push: {} ({} ok, {} failed)",
                    at.format("%Y-%m-%d %H:%M"),
                    push.success,
                    push.failed
                ),
                _ => println!("  Last push: never"),
            }
            match (history.last_pull_at, history.last_pull) {
                (Some(at), Some(pull)) => println!(
                    "  Last pull: {} ({} trip(s))",
                    at.format("%Y-%m-%d %H:%M"),
                    pull.success
                ),
                _ => println!("  Last pull: never"),
            }
            if let Some(ref error) = history.last_error {
                println!("  Last error: {}", error);
            }
            println!();
            println!("Queue:");
            println!("  Pending: {}", queue.pending);
            println!("  Failed:  {}", queue.failed);
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!();
            println!("Contents:");
            println!("  Trips:       {}", counts.trips);
            println!("  Flights:     {}", counts.flights);
            println!("  Hotels:      {}", counts.hotels);
            println!("  Activities:  {}", counts.activities);
            println!("  Restaurants: {}", counts.restaurants);
        }
    }

    Ok(())
}
