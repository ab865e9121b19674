//! Core domain types for the batch file pipeline.
//!
//! This crate contains shared types used across all packages:
//! - QueueEntry and EntryStatus for submitted files
//! - FileQueueStore, the ordered entry collection
//! - Events and reports for progress updates
//! - PipelineConfig

mod config;
mod entry;
mod error;
mod events;
mod store;

pub use config::{DispatchMode, PipelineConfig};
pub use entry::{EntryId, EntryStatus, EntrySummary, QueueEntry, ResultPayload, SourceFile, StatusKind};
pub use error::{ConfigError, QueueError};
pub use events::{BatchEvent, BatchReport};
pub use store::{FileQueueStore, QueueStats};
