//! Queue-based sync with the remote document store
//!
//! Local mutations land in the sync queue (see [`crate::storage::queue`]).
//! [`PushSynchronizer`] drains that queue to the remote, [`PullSynchronizer`]
//! hydrates local storage from it, and [`SyncOrchestrator`] decides when
//! either runs.

pub mod error;
pub mod orchestrator;
pub mod pull;
pub mod push;
pub mod state;

pub use error::{SyncError, SyncResult};
pub use orchestrator::{
    Action, OrchestratorHandle, Scheduler, SyncOrchestrator, SyncPolicy, Trigger,
};
pub use pull::{PullSummary, PullSynchronizer};
pub use push::{PushSummary, PushSynchronizer};
pub use state::{InFlightGuard, SyncHistory, SyncKind, SyncState};
