//! Event types for live progress updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, EntrySummary};

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Sequence number of the run, starting at 1.
    pub run: u64,
    /// Entries in the snapshot taken when the run started.
    pub scheduled: usize,
    pub done: usize,
    pub failed: usize,
    /// Snapshot entries removed before their turn came.
    pub skipped: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn empty(run: u64) -> Self {
        Self {
            run,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.done + self.failed
    }
}

/// Events emitted by the batch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Files were submitted.
    EntriesAdded {
        entries: Vec<EntrySummary>,
        timestamp: DateTime<Utc>,
    },
    /// An entry was removed by the user.
    EntryRemoved {
        entry_id: EntryId,
        timestamp: DateTime<Utc>,
    },
    /// The queue was emptied.
    QueueCleared {
        removed: usize,
        timestamp: DateTime<Utc>,
    },
    BatchStarted {
        run: u64,
        scheduled: usize,
        timestamp: DateTime<Utc>,
    },
    /// The transform started on an entry.
    EntryStarted {
        run: u64,
        entry_id: EntryId,
        position: usize,
        timestamp: DateTime<Utc>,
    },
    EntryCompleted {
        run: u64,
        entry_id: EntryId,
        output_name: String,
        size_bytes: u64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    EntryFailed {
        run: u64,
        entry_id: EntryId,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// A snapshot entry was gone by the time its turn came.
    EntrySkipped {
        run: u64,
        entry_id: EntryId,
        timestamp: DateTime<Utc>,
    },
    BatchFinished {
        report: BatchReport,
        timestamp: DateTime<Utc>,
    },
}

impl BatchEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BatchEvent::EntriesAdded { timestamp, .. } => *timestamp,
            BatchEvent::EntryRemoved { timestamp, .. } => *timestamp,
            BatchEvent::QueueCleared { timestamp, .. } => *timestamp,
            BatchEvent::BatchStarted { timestamp, .. } => *timestamp,
            BatchEvent::EntryStarted { timestamp, .. } => *timestamp,
            BatchEvent::EntryCompleted { timestamp, .. } => *timestamp,
            BatchEvent::EntryFailed { timestamp, .. } => *timestamp,
            BatchEvent::EntrySkipped { timestamp, .. } => *timestamp,
            BatchEvent::BatchFinished { timestamp, .. } => *timestamp,
        }
    }

    /// The entry this event is about, if it concerns a single entry.
    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            BatchEvent::EntryRemoved { entry_id, .. }
            | BatchEvent::EntryStarted { entry_id, .. }
            | BatchEvent::EntryCompleted { entry_id, .. }
            | BatchEvent::EntryFailed { entry_id, .. }
            | BatchEvent::EntrySkipped { entry_id, .. } => Some(*entry_id),
            BatchEvent::EntriesAdded { .. }
            | BatchEvent::QueueCleared { .. }
            | BatchEvent::BatchStarted { .. }
            | BatchEvent::BatchFinished { .. } => None,
        }
    }

    /// Short description for logging.
    pub fn description(&self) -> String {
        match self {
            BatchEvent::EntriesAdded { entries, .. } => {
                format!("{} file(s) added", entries.len())
            }
            BatchEvent::EntryRemoved { entry_id, .. } => format!("Entry {} removed", entry_id),
            BatchEvent::QueueCleared { removed, .. } => {
                format!("Queue cleared ({} removed)", removed)
            }
            BatchEvent::BatchStarted { run, scheduled, .. } => {
                format!("Batch {} started with {} entries", run, scheduled)
            }
            BatchEvent::EntryStarted {
                entry_id, position, ..
            } => format!("Entry {} processing (#{})", entry_id, position + 1),
            BatchEvent::EntryCompleted {
                entry_id,
                output_name,
                duration_ms,
                ..
            } => format!(
                "Entry {} done as {} in {}ms",
                entry_id, output_name, duration_ms
            ),
            BatchEvent::EntryFailed {
                entry_id, message, ..
            } => format!("Entry {} failed: {}", entry_id, message),
            BatchEvent::EntrySkipped { entry_id, .. } => {
                format!("Entry {} skipped (removed)", entry_id)
            }
            BatchEvent::BatchFinished { report, .. } => format!(
                "Batch {} finished: {} done, {} failed, {} skipped",
                report.run, report.done, report.failed, report.skipped
            ),
        }
    }
}
