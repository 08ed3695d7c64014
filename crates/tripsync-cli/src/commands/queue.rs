//! Sync queue command handlers

use anyhow::{Context, Result};

use tripsync_core::Store;

use crate::output::Output;

pub fn status(store: &Store, output: &Output) -> Result<()> {
    let status = store.queue_status(store.config().retry_ceiling)?;
    output.print_queue_status(&status);
    Ok(())
}

pub fn list(store: &Store, output: &Output) -> Result<()> {
    let entries = store.pending_entries()?;
    output.print_queue(&entries, store.config().retry_ceiling);
    Ok(())
}

/// Drop queued entries; with `failed_only`, just those past the retry ceiling
///
/// Local records are kept either way; the dropped changes simply never
/// reach the remote.
pub fn clear(store: &mut Store, failed_only: bool, output: &Output) -> Result<()> {
    let cleared = if failed_only {
        let ceiling = store.config().retry_ceiling;
        store
            .clear_failed(ceiling)
            .context("Failed to clear failed entries")?
    } else {
        store.clear_queue().context("Failed to clear queue")?
    };

    output.success(&format!("Cleared {} queue entry(ies)", cleared));
    Ok(())
}

/// Reset retry counts so failed entries are attempted again
pub fn retry(store: &mut Store, output: &Output) -> Result<()> {
    let ceiling = store.config().retry_ceiling;
    let reset = store
        .retry_failed(ceiling)
        .context("Failed to reset failed entries")?;

    output.success(&format!("{} entry(ies) will be retried on the next push", reset));
    Ok(())
}
