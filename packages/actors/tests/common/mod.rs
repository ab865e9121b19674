#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actors::{
    BatchHandle, PipelineConfig, ResultPayload, SourceFile, Transform, TransformError,
    TransformFuture,
};
use tokio::sync::{Semaphore, mpsc};

pub async fn start() -> BatchHandle {
    start_with(PipelineConfig::default().with_download_delay_ms(0)).await
}

pub async fn start_with(config: PipelineConfig) -> BatchHandle {
    let (batch, _join) = BatchHandle::start(config)
        .await
        .expect("spawn batch actor");
    batch
}

pub fn file(name: &str, size: usize) -> SourceFile {
    SourceFile::new(name, vec![0u8; size])
}

/// Records call order and the highest number of overlapping calls.
#[derive(Default)]
pub struct Tracker {
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl Tracker {
    fn enter(&self, name: &str) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("start:{name}"));
    }

    fn exit(&self, name: &str) {
        self.log.lock().unwrap().push(format!("end:{name}"));
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// Upper-cases names, fails for names listed in `failing`, and can be
/// held at a gate until the test releases permits.
pub struct TestTransform {
    pub tracker: Arc<Tracker>,
    failing: Vec<(String, Option<String>)>,
    gate: Option<Arc<Semaphore>>,
    started: Option<mpsc::UnboundedSender<String>>,
}

impl TestTransform {
    pub fn new() -> Self {
        Self {
            tracker: Arc::new(Tracker::default()),
            failing: Vec::new(),
            gate: None,
            started: None,
        }
    }

    pub fn failing_on(mut self, name: &str, message: Option<&str>) -> Self {
        self.failing
            .push((name.to_string(), message.map(str::to_string)));
        self
    }

    /// Every call waits for one permit; started names are sent on the channel.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<String>) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        self.gate = Some(gate.clone());
        self.started = Some(tx);
        (self, gate, rx)
    }
}

impl Transform for TestTransform {
    fn name(&self) -> &str {
        "test"
    }

    fn transform(&self, source: &SourceFile) -> TransformFuture {
        let name = source.name.clone();
        let tracker = self.tracker.clone();
        let gate = self.gate.clone();
        let started = self.started.clone();
        let failure = self
            .failing
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, message)| message.clone());

        Box::pin(async move {
            tracker.enter(&name);
            if let Some(started) = started {
                let _ = started.send(name.clone());
            }
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            tokio::task::yield_now().await;
            tracker.exit(&name);

            match failure {
                Some(Some(message)) => Err(TransformError::new(message)),
                Some(None) => Err(TransformError::unknown()),
                None => Ok(ResultPayload::named(name.to_uppercase(), vec![1u8])),
            }
        })
    }
}
