//! Result dispatcher turning finished entries into downloads.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use batch_core::{DispatchMode, EntryId, QueueEntry};
use bytes::Bytes;
use serde::Serialize;
use storage::{OutputError, OutputStore};

use crate::handle::BatchHandle;
use crate::messages::BatchError;

/// Errors raised while delivering results.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Future type for sink writes.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'a>>;

/// Destination for downloaded results.
///
/// The payload handle is dropped as soon as `save` resolves.
pub trait DownloadSink: Send + Sync + 'static {
    fn save<'a>(&'a self, file_name: &'a str, data: Bytes) -> SinkFuture<'a>;
}

impl DownloadSink for OutputStore {
    fn save<'a>(&'a self, file_name: &'a str, data: Bytes) -> SinkFuture<'a> {
        Box::pin(async move {
            self.save_file(file_name, data).await?;
            Ok(())
        })
    }
}

/// A download that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub entry_id: EntryId,
    pub file_name: String,
    pub error: String,
}

/// Outcome of `download_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// File names delivered, in queue order.
    pub delivered: Vec<String>,
    pub failed: Vec<DownloadFailure>,
}

/// Reduce a name to its last path component, as a browser download would.
pub fn download_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        "download".to_string()
    } else {
        base.to_string()
    }
}

struct Download {
    entry_id: EntryId,
    file_name: String,
    data: Bytes,
}

impl Download {
    fn of(entry: &QueueEntry) -> Option<Self> {
        let name = entry.download_name()?;
        let data = entry.result()?.data.clone();
        Some(Self {
            entry_id: entry.id,
            file_name: download_file_name(name),
            data,
        })
    }
}

/// Delivers `Done` entries to a sink. Never mutates the queue.
#[derive(Clone)]
pub struct ResultDispatcher {
    batch: BatchHandle,
    sink: Arc<dyn DownloadSink>,
    delay: Duration,
    mode: DispatchMode,
}

impl ResultDispatcher {
    /// Create a dispatcher using the pipeline's delay and dispatch mode.
    pub fn new(batch: BatchHandle, sink: Arc<dyn DownloadSink>) -> Self {
        let delay = batch.config().download_delay();
        let mode = batch.config().dispatch_mode;
        Self {
            batch,
            sink,
            delay,
            mode,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Download one entry's result. Missing or unfinished entries are a
    /// silent no-op returning `Ok(false)`.
    pub async fn download_one(&self, entry_id: EntryId) -> Result<bool, DispatchError> {
        let Some(download) = self.batch.entry(entry_id).await?.as_ref().and_then(Download::of)
        else {
            return Ok(false);
        };
        self.sink.save(&download.file_name, download.data).await?;
        tracing::info!("Downloaded {}", download.file_name);
        Ok(true)
    }

    /// Download every `Done` entry in queue order.
    ///
    /// Sequential mode spaces downloads by the configured delay. A failed
    /// download is reported and does not stop the others.
    pub async fn download_all(&self) -> Result<DownloadReport, DispatchError> {
        let downloads: Vec<Download> = self
            .batch
            .entries()
            .await?
            .iter()
            .filter_map(Download::of)
            .collect();

        let mut report = DownloadReport::default();
        match self.mode {
            DispatchMode::Sequential => {
                for (i, download) in downloads.into_iter().enumerate() {
                    if i > 0 && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    let result = self.sink.save(&download.file_name, download.data.clone()).await;
                    record(&mut report, download, result);
                }
            }
            DispatchMode::Parallel => {
                let results = futures_util::future::join_all(
                    downloads
                        .iter()
                        .map(|d| self.sink.save(&d.file_name, d.data.clone())),
                )
                .await;
                for (download, result) in downloads.into_iter().zip(results) {
                    record(&mut report, download, result);
                }
            }
        }

        tracing::info!(
            "Dispatched {} download(s), {} failed",
            report.delivered.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

fn record(report: &mut DownloadReport, download: Download, result: Result<(), DispatchError>) {
    match result {
        Ok(()) => report.delivered.push(download.file_name),
        Err(e) => {
            tracing::warn!("Failed to download {}: {}", download.file_name, e);
            report.failed.push(DownloadFailure {
                entry_id: download.entry_id,
                file_name: download.file_name,
                error: e.to_string(),
            });
        }
    }
}
