//! Entry domain types for files tracked through a batch.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a queue entry, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Ulid);

impl EntryId {
    /// Create a new unique entry ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Original file content handed to a transform.
///
/// `content` is a reference-counted buffer, so handing the source to the
/// driver does not copy the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Original file name as submitted.
    pub name: String,
    /// Raw file bytes.
    pub content: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Size of the file content in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Output produced by a successful transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Name to download the result under. Falls back to the entry name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// Opaque result bytes.
    pub data: Bytes,
}

impl ResultPayload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            output_name: None,
            data: data.into(),
        }
    }

    pub fn named(output_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            output_name: Some(output_name.into()),
            data: data.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Fieldless status discriminant, used for display and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Pending,
    Processing,
    Done,
    Error,
}

impl StatusKind {
    pub const ALL: [StatusKind; 4] = [
        StatusKind::Pending,
        StatusKind::Processing,
        StatusKind::Done,
        StatusKind::Error,
    ];

    /// Machine-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Pending => "pending",
            StatusKind::Processing => "processing",
            StatusKind::Done => "done",
            StatusKind::Error => "error",
        }
    }

    /// Human-readable label for listings.
    pub fn label(self) -> &'static str {
        match self {
            StatusKind::Pending => "Pending",
            StatusKind::Processing => "Processing",
            StatusKind::Done => "Done",
            StatusKind::Error => "Error",
        }
    }

    /// Badge class for front ends that colour entries by status.
    pub fn badge_class(self) -> &'static str {
        match self {
            StatusKind::Pending => "badge-pending",
            StatusKind::Processing => "badge-running",
            StatusKind::Done => "badge-completed",
            StatusKind::Error => "badge-failed",
        }
    }

    /// No further automatic transition happens from a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusKind::Done | StatusKind::Error)
    }

    /// Whether a new batch run picks the entry up.
    pub fn is_eligible(self) -> bool {
        matches!(self, StatusKind::Pending | StatusKind::Processing)
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status of an entry in its lifecycle.
///
/// The result only exists on `Done` and the message only on `Error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for a batch run.
    #[default]
    Pending,
    /// The transform is running on this entry.
    Processing { started_at: DateTime<Utc> },
    /// The transform produced a result.
    Done {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        result: ResultPayload,
    },
    /// The transform failed.
    Error {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        message: String,
    },
}

impl EntryStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            EntryStatus::Pending => StatusKind::Pending,
            EntryStatus::Processing { .. } => StatusKind::Processing,
            EntryStatus::Done { .. } => StatusKind::Done,
            EntryStatus::Error { .. } => StatusKind::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }
}

/// One file tracked through the batch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique identifier for this entry.
    pub id: EntryId,
    /// Original file name.
    pub name: String,
    /// Original file size.
    pub size_bytes: u64,
    /// Current status, carrying the result or error once terminal.
    pub status: EntryStatus,
    /// Original content, kept so the transform can be re-invoked.
    pub source: SourceFile,
    /// When the entry was added.
    pub added_at: DateTime<Utc>,
    /// When the entry last changed.
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Create a new pending entry for a submitted file.
    pub fn new(source: SourceFile) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            name: source.name.clone(),
            size_bytes: source.size_bytes(),
            status: EntryStatus::Pending,
            source,
            added_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    pub fn result(&self) -> Option<&ResultPayload> {
        match &self.status {
            EntryStatus::Done { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            EntryStatus::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// File name a download of this entry's result is saved under.
    pub fn download_name(&self) -> Option<&str> {
        self.result()
            .map(|result| result.output_name.as_deref().unwrap_or(&self.name))
    }

    /// Byte-free view for events and listings.
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.id,
            name: self.name.clone(),
            size_bytes: self.size_bytes,
            status: self.kind(),
            result_name: self.result().and_then(|r| r.output_name.clone()),
            result_size: self.result().map(ResultPayload::size_bytes),
            error_message: self.error_message().map(str::to_string),
        }
    }
}

/// Serializable snapshot of an entry without its file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub id: EntryId,
    pub name: String,
    pub size_bytes: u64,
    pub status: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
