//! Message types for actor communication.

use std::sync::Arc;

use batch_core::{
    BatchEvent, BatchReport, EntryId, QueueEntry, QueueError, QueueStats, SourceFile,
};
use chrono::{DateTime, Utc};
use ractor::RpcReplyPort;
use tokio::sync::broadcast;

use crate::transform::{Transform, TransformResult};

/// Messages for the BatchActor.
#[derive(Debug)]
pub enum BatchMessage {
    /// Append files as new pending entries.
    AddFiles {
        files: Vec<SourceFile>,
        reply: RpcReplyPort<Vec<EntryId>>,
    },

    /// Remove one entry. Replies `Ok(false)` when the id is unknown.
    RemoveFile {
        entry_id: EntryId,
        reply: RpcReplyPort<Result<bool, BatchError>>,
    },

    /// Remove every entry.
    Clear {
        reply: RpcReplyPort<Result<usize, BatchError>>,
    },

    /// Start a batch run. The reply arrives when the run finishes.
    StartBatch {
        transform: Arc<dyn Transform>,
        reply: RpcReplyPort<Result<BatchReport, BatchError>>,
    },

    /// Driver: mark an entry processing and hand over its source.
    BeginEntry {
        run: u64,
        entry_id: EntryId,
        position: usize,
        reply: RpcReplyPort<Option<SourceFile>>,
    },

    /// Driver: record the outcome of a transform call.
    FinishEntry {
        run: u64,
        entry_id: EntryId,
        started_at: DateTime<Utc>,
        outcome: TransformResult,
        reply: RpcReplyPort<()>,
    },

    /// Driver: the snapshot has been worked through.
    BatchFinished { report: BatchReport },

    /// Get an entry by ID.
    GetEntry {
        entry_id: EntryId,
        reply: RpcReplyPort<Option<QueueEntry>>,
    },

    /// List all entries in queue order.
    ListEntries { reply: RpcReplyPort<Vec<QueueEntry>> },

    /// Get per-status counts.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Whether a batch run is in flight.
    IsProcessing { reply: RpcReplyPort<bool> },

    /// Subscribe to progress events.
    Subscribe {
        reply: RpcReplyPort<broadcast::Receiver<BatchEvent>>,
    },

    /// Stop the actor and its driver.
    Shutdown,
}

/// Messages for the DriverActor.
#[derive(Debug)]
pub enum DriverMessage {
    /// Work through a snapshot of entry ids, in order.
    Run {
        run: u64,
        entries: Vec<EntryId>,
        transform: Arc<dyn Transform>,
    },
}

/// Error type for batch operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("a batch run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("processing driver stopped: {0}")]
    DriverStopped(String),

    #[error("actor error: {0}")]
    Actor(String),

    #[error("timeout")]
    Timeout,
}
