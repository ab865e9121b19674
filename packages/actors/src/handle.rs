//! Async handle wrapping the batch actor.

use std::sync::Arc;
use std::time::Duration;

use batch_core::{
    BatchEvent, BatchReport, EntryId, PipelineConfig, QueueEntry, QueueStats, SourceFile,
};
use ractor::rpc::CallResult;
use ractor::{ActorRef, RpcReplyPort};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::batch_actor::start_batch_actor;
use crate::messages::{BatchError, BatchMessage};
use crate::transform::Transform;

/// Timeout for queries and mutations. Batch runs have none.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable front door to a running batch pipeline.
#[derive(Clone)]
pub struct BatchHandle {
    actor: ActorRef<BatchMessage>,
    config: PipelineConfig,
}

impl BatchHandle {
    /// Spawn the batch actor and its driver.
    pub async fn start(
        config: PipelineConfig,
    ) -> Result<(Self, JoinHandle<()>), ractor::SpawnErr> {
        let (actor, join) = start_batch_actor(config.clone()).await?;
        Ok((Self { actor, config }, join))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn actor(&self) -> &ActorRef<BatchMessage> {
        &self.actor
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> BatchMessage,
        timeout: Option<Duration>,
    ) -> Result<T, BatchError>
    where
        T: Send + 'static,
    {
        match ractor::rpc::call(&self.actor, build, timeout).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(BatchError::Timeout),
            Ok(CallResult::SenderError) => Err(BatchError::Actor("reply dropped".into())),
            Err(e) => Err(BatchError::Actor(e.to_string())),
        }
    }

    /// Append files as pending entries, returning their ids in order.
    pub async fn add_files(&self, files: Vec<SourceFile>) -> Result<Vec<EntryId>, BatchError> {
        self.call(|reply| BatchMessage::AddFiles { files, reply }, Some(CALL_TIMEOUT))
            .await
    }

    /// Remove an entry. `Ok(false)` when it did not exist.
    pub async fn remove_file(&self, entry_id: EntryId) -> Result<bool, BatchError> {
        self.call(
            |reply| BatchMessage::RemoveFile { entry_id, reply },
            Some(CALL_TIMEOUT),
        )
        .await?
    }

    /// Remove every entry, returning how many were removed.
    pub async fn clear(&self) -> Result<usize, BatchError> {
        self.call(|reply| BatchMessage::Clear { reply }, Some(CALL_TIMEOUT))
            .await?
    }

    /// Run `transform` over every eligible entry and wait for the run to end.
    ///
    /// Fails with [`BatchError::AlreadyRunning`] while another run is in
    /// flight. Individual transform failures do not fail the run.
    pub async fn run_batch(&self, transform: Arc<dyn Transform>) -> Result<BatchReport, BatchError> {
        self.call(
            |reply| BatchMessage::StartBatch { transform, reply },
            None,
        )
        .await?
    }

    pub async fn entry(&self, entry_id: EntryId) -> Result<Option<QueueEntry>, BatchError> {
        self.call(
            |reply| BatchMessage::GetEntry { entry_id, reply },
            Some(CALL_TIMEOUT),
        )
        .await
    }

    /// All entries in queue order.
    pub async fn entries(&self) -> Result<Vec<QueueEntry>, BatchError> {
        self.call(|reply| BatchMessage::ListEntries { reply }, Some(CALL_TIMEOUT))
            .await
    }

    pub async fn stats(&self) -> Result<QueueStats, BatchError> {
        self.call(|reply| BatchMessage::GetStats { reply }, Some(CALL_TIMEOUT))
            .await
    }

    pub async fn is_processing(&self) -> Result<bool, BatchError> {
        self.call(|reply| BatchMessage::IsProcessing { reply }, Some(CALL_TIMEOUT))
            .await
    }

    /// Receive progress events from now on.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<BatchEvent>, BatchError> {
        self.call(|reply| BatchMessage::Subscribe { reply }, Some(CALL_TIMEOUT))
            .await
    }

    /// Stop the batch actor. An in-flight run resolves with an error.
    pub fn shutdown(&self) -> Result<(), BatchError> {
        self.actor
            .send_message(BatchMessage::Shutdown)
            .map_err(|e| BatchError::Actor(e.to_string()))
    }
}
