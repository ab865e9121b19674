//! Error types for queue mutation and configuration.

use crate::{EntryId, StatusKind};

/// Rejected queue mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("entry {0} is being processed")]
    EntryProcessing(EntryId),

    #[error("entry {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: EntryId,
        from: StatusKind,
        to: StatusKind,
    },
}

/// Invalid pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
