//! Sync command handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use tripsync_core::{Identity, PullSummary, PushSummary, Store, SyncEvent, Trigger};

use super::{build_remote, orchestrator};
use crate::output::{Output, OutputFormat};

/// Drain the sync queue once
pub async fn push(store: Store, identity: &Identity, output: &Output) -> Result<()> {
    let remote = build_remote(store.config())?;
    let orchestrator = orchestrator(store, remote);

    output.message("Pushing queued changes...");
    match orchestrator
        .push_now(identity)
        .await
        .context("Push failed")?
    {
        Some(summary) => report_push(&summary, output),
        None => output.message("A push is already running."),
    }
    Ok(())
}

/// Download every trip shared with the identity
pub async fn pull(store: Store, identity: &Identity, output: &Output) -> Result<()> {
    let remote = build_remote(store.config())?;
    let orchestrator = orchestrator(store, remote);

    output.message("Pulling trips...");
    match orchestrator
        .pull_now(identity)
        .await
        .context("Pull failed")?
    {
        Some(summary) => report_pull(&summary, output),
        None => output.message("A pull is already running."),
    }
    Ok(())
}

/// Run the background sync loop until Ctrl-C
pub async fn watch(store: Store, identity: &Identity, output: &Output) -> Result<()> {
    let remote = build_remote(store.config())?;
    let orchestrator = Arc::new(orchestrator(store, remote));

    let format = output.format;
    orchestrator.subscribe(move |event| print_event(format, event));

    let handle = orchestrator.clone().spawn();
    handle.send(Trigger::Login(identity.clone()));

    output.message(&format!(
        "Syncing as {}. Press Ctrl-C to stop.",
        identity
    ));
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    output.message("Stopping, waiting for running syncs to finish...");
    handle.shutdown().await;
    Ok(())
}

fn report_push(summary: &PushSummary, output: &Output) {
    match output.format {
        OutputFormat::Json => output.json(summary),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            output.success(&format!(
                "Pushed {} of {} change(s)",
                summary.success, summary.total
            ));
            if summary.failed > 0 {
                println!(
                    "  {} change(s) failed; see `tripsync queue list`",
                    summary.failed
                );
            }
        }
    }
}

fn report_pull(summary: &PullSummary, output: &Output) {
    match output.format {
        OutputFormat::Json => output.json(summary),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            output.success(&format!(
                "Pulled {} of {} trip(s)",
                summary.success, summary.total
            ));
            if summary.failed > 0 {
                println!("  {} trip(s) failed; run with -v for details", summary.failed);
            }
        }
    }
}

/// One line per event for `sync watch`
fn print_event(format: OutputFormat, event: &SyncEvent) {
    match format {
        OutputFormat::Quiet => {}
        OutputFormat::Json => println!("{}", event_json(event)),
        OutputFormat::Human => match event {
            SyncEvent::QueueChanged { pending } => println!("Queue: {} pending", pending),
            SyncEvent::StatusChanged(status) => println!("Status: {}", status.as_str()),
            SyncEvent::PushCompleted(s) => {
                println!("Push: {} ok, {} failed, {} total", s.success, s.failed, s.total)
            }
            SyncEvent::PullCompleted(s) => {
                println!("Pull: {} ok, {} failed, {} total", s.success, s.failed, s.total)
            }
            SyncEvent::Error(message) => eprintln!("Sync error: {}", message),
        },
    }
}

fn event_json(event: &SyncEvent) -> serde_json::Value {
    match event {
        SyncEvent::QueueChanged { pending } => json!({"event": "queue_changed", "pending": pending}),
        SyncEvent::StatusChanged(status) => json!({"event": "status_changed", "status": status}),
        SyncEvent::PushCompleted(summary) => json!({"event": "push_completed", "summary": summary}),
        SyncEvent::PullCompleted(summary) => json!({"event": "pull_completed", "summary": summary}),
        SyncEvent::Error(message) => json!({"event": "error", "message": message}),
    }
}
