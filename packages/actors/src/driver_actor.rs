//! Driver actor that applies a transform to a batch snapshot, one entry at a time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use batch_core::{BatchReport, EntryId, SourceFile};
use chrono::Utc;
use futures_util::FutureExt;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{BatchMessage, DriverMessage};
use crate::transform::{Transform, TransformError, TransformResult};

/// Driver actor arguments.
pub struct DriverArgs {
    pub batch: ActorRef<BatchMessage>,
    pub transform_timeout: Option<Duration>,
}

/// State for the driver actor.
pub struct DriverState {
    batch: ActorRef<BatchMessage>,
    transform_timeout: Option<Duration>,
}

impl DriverState {
    async fn run(
        &self,
        run: u64,
        entries: Vec<EntryId>,
        transform: Arc<dyn Transform>,
    ) -> Result<BatchReport, ActorProcessingErr> {
        let started = Instant::now();
        let mut report = BatchReport {
            run,
            scheduled: entries.len(),
            ..BatchReport::default()
        };

        for (position, entry_id) in entries.into_iter().enumerate() {
            let source = match ractor::rpc::call(
                &self.batch,
                |reply| BatchMessage::BeginEntry {
                    run,
                    entry_id,
                    position,
                    reply,
                },
                None,
            )
            .await?
            {
                CallResult::Success(Some(source)) => source,
                CallResult::Success(None) => {
                    report.skipped += 1;
                    continue;
                }
                CallResult::Timeout | CallResult::SenderError => {
                    return Err(ActorProcessingErr::from("batch actor did not answer"));
                }
            };

            let started_at = Utc::now();
            tracing::debug!("Transforming {} ({} bytes)", source.name, source.size_bytes());
            let outcome = match self.transform_timeout {
                Some(limit) => tokio::time::timeout(limit, apply(transform.as_ref(), &source))
                    .await
                    .unwrap_or_else(|_| {
                        Err(TransformError::new(format!(
                            "Transform timed out after {}s",
                            limit.as_secs()
                        )))
                    }),
                None => apply(transform.as_ref(), &source).await,
            };
            drop(source);

            match &outcome {
                Ok(_) => report.done += 1,
                Err(e) => {
                    tracing::debug!("Entry {} failed: {}", entry_id, e);
                    report.failed += 1;
                }
            }

            ractor::rpc::call(
                &self.batch,
                |reply| BatchMessage::FinishEntry {
                    run,
                    entry_id,
                    started_at,
                    outcome,
                    reply,
                },
                None,
            )
            .await?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}

/// Run one transform call. A panic while building or polling the future
/// becomes the entry's failure instead of taking the driver down.
async fn apply(transform: &dyn Transform, source: &SourceFile) -> TransformResult {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| transform.transform(source))) {
        Ok(future) => future,
        Err(payload) => return Err(panic_error(transform.name(), payload)),
    };
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panic_error(transform.name(), payload)))
}

fn panic_error(transform: &str, payload: Box<dyn Any + Send>) -> TransformError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    tracing::warn!(
        "Transform '{}' panicked: {}",
        transform,
        message.as_deref().unwrap_or("<no message>")
    );
    message.map_or_else(TransformError::unknown, TransformError::new)
}

/// Processing driver. Runs are serialized by the actor mailbox.
pub struct DriverActor;

impl Actor for DriverActor {
    type Msg = DriverMessage;
    type State = DriverState;
    type Arguments = DriverArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting processing driver");
        Ok(DriverState {
            batch: args.batch,
            transform_timeout: args.transform_timeout,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DriverMessage::Run {
                run,
                entries,
                transform,
            } => {
                let report = state.run(run, entries, transform).await?;
                state
                    .batch
                    .send_message(BatchMessage::BatchFinished { report })?;
            }
        }

        Ok(())
    }
}
