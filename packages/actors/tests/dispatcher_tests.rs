#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use actors::{DispatchError, DownloadSink, ResultDispatcher, SinkFuture};
use batch_core::{DispatchMode, PipelineConfig, StatusKind};
use bytes::Bytes;
use common::{TestTransform, file, start, start_with};
use storage::{OutputConfig, OutputStore};

/// Records every save; fails saves of names listed in `reject`.
#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<(String, Bytes, Instant)>>,
    reject: Vec<String>,
}

impl RecordingSink {
    fn rejecting(name: &str) -> Self {
        Self {
            reject: vec![name.to_string()],
            ..Self::default()
        }
    }

    fn names(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    fn times(&self) -> Vec<Instant> {
        self.saved.lock().unwrap().iter().map(|(_, _, at)| *at).collect()
    }
}

impl DownloadSink for RecordingSink {
    fn save<'a>(&'a self, file_name: &'a str, data: Bytes) -> SinkFuture<'a> {
        Box::pin(async move {
            if self.reject.iter().any(|n| n == file_name) {
                return Err(DispatchError::Sink(format!("{file_name} rejected")));
            }
            self.saved
                .lock()
                .unwrap()
                .push((file_name.to_string(), data, Instant::now()));
            Ok(())
        })
    }
}

#[tokio::test]
async fn unfinished_entries_are_not_downloaded() -> Result<(), Box<dyn std::error::Error>> {
    let batch = start().await;
    let ids = batch.add_files(vec![file("a", 1), file("b", 1)]).await?;
    batch
        .run_batch(Arc::new(TestTransform::new().failing_on("b", Some("bad"))))
        .await?;
    let pending = batch.add_files(vec![file("c", 1)]).await?;

    let sink = Arc::new(RecordingSink::default());
    let dispatcher = ResultDispatcher::new(batch.clone(), sink.clone());

    assert!(!dispatcher.download_one(ids[1]).await?);
    assert!(!dispatcher.download_one(pending[0]).await?);
    assert!(!dispatcher.download_one(batch_core::EntryId::new()).await?);
    assert!(sink.names().is_empty());

    assert!(dispatcher.download_one(ids[0]).await?);
    assert_eq!(sink.names(), ["A"]);

    // Downloading never changes the queue.
    let kinds: Vec<_> = batch.entries().await?.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, [StatusKind::Done, StatusKind::Error, StatusKind::Pending]);
    Ok(())
}

#[tokio::test]
async fn download_all_delivers_done_entries_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let batch = start().await;
    batch
        .add_files(vec![file("a.png", 100), file("b.png", 200), file("c.png", 50)])
        .await?;
    batch.run_batch(Arc::new(TestTransform::new())).await?;

    let sink = Arc::new(RecordingSink::default());
    let report = ResultDispatcher::new(batch.clone(), sink.clone())
        .download_all()
        .await?;

    assert_eq!(report.delivered, ["A.PNG", "B.PNG", "C.PNG"]);
    assert!(report.failed.is_empty());
    assert_eq!(sink.names(), ["A.PNG", "B.PNG", "C.PNG"]);
    Ok(())
}

#[tokio::test]
async fn removed_results_are_not_downloaded() -> Result<(), Box<dyn std::error::Error>> {
    let batch = start().await;
    let ids = batch
        .add_files(vec![file("a", 1), file("b", 1), file("c", 1), file("d", 1)])
        .await?;
    batch
        .run_batch(Arc::new(TestTransform::new().failing_on("c", Some("bad"))))
        .await?;

    assert!(batch.remove_file(ids[1]).await?);
    assert!(batch.remove_file(ids[2]).await?);
    let remaining: Vec<_> = batch.entries().await?.iter().map(|e| e.id).collect();
    assert_eq!(remaining, [ids[0], ids[3]]);

    let sink = Arc::new(RecordingSink::default());
    let report = ResultDispatcher::new(batch.clone(), sink.clone())
        .download_all()
        .await?;
    assert_eq!(report.delivered, ["A", "D"]);
    assert!(report.failed.is_empty());
    assert_eq!(sink.names(), ["A", "D"]);
    Ok(())
}

#[tokio::test]
async fn sequential_downloads_are_spaced() -> Result<(), Box<dyn std::error::Error>> {
    let delay = Duration::from_millis(40);
    let batch = start_with(PipelineConfig::default().with_download_delay_ms(40)).await;
    batch
        .add_files(vec![file("a", 1), file("b", 1), file("c", 1)])
        .await?;
    batch.run_batch(Arc::new(TestTransform::new())).await?;

    let sink = Arc::new(RecordingSink::default());
    ResultDispatcher::new(batch.clone(), sink.clone())
        .download_all()
        .await?;

    let times = sink.times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= delay);
    }
    Ok(())
}

#[tokio::test]
async fn failed_save_does_not_stop_other_downloads() -> Result<(), Box<dyn std::error::Error>> {
    let batch = start().await;
    let ids = batch
        .add_files(vec![file("a", 1), file("b", 1), file("c", 1)])
        .await?;
    batch.run_batch(Arc::new(TestTransform::new())).await?;

    for mode in [DispatchMode::Sequential, DispatchMode::Parallel] {
        let sink = Arc::new(RecordingSink::rejecting("B"));
        let report = ResultDispatcher::new(batch.clone(), sink.clone())
            .with_mode(mode)
            .download_all()
            .await?;

        assert_eq!(report.delivered, ["A", "C"], "{mode:?}");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].entry_id, ids[1]);
        assert_eq!(report.failed[0].file_name, "B");
        assert!(report.failed[0].error.contains("rejected"));
    }
    Ok(())
}

#[tokio::test]
async fn results_land_in_the_output_store() -> Result<(), Box<dyn std::error::Error>> {
    let batch = start().await;
    batch.add_files(vec![file("photo.png", 8)]).await?;
    batch.run_batch(Arc::new(TestTransform::new())).await?;

    let store = OutputStore::new(OutputConfig::memory()).await?;
    let report = ResultDispatcher::new(batch.clone(), Arc::new(store.clone()))
        .with_delay(Duration::ZERO)
        .download_all()
        .await?;

    assert_eq!(report.delivered, ["PHOTO.PNG"]);
    assert_eq!(store.load_file("PHOTO.PNG").await?, Bytes::from_static(&[1]));
    Ok(())
}
