//! Batch actor owning the file queue and the active-run guard.

use std::sync::Arc;

use batch_core::{
    BatchEvent, BatchReport, EntryId, EntryStatus, FileQueueStore, PipelineConfig, QueueError,
    StatusKind,
};
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tokio::sync::broadcast;

use crate::driver_actor::{DriverActor, DriverArgs};
use crate::messages::{BatchError, BatchMessage, DriverMessage};

/// The run currently in flight.
struct ActiveRun {
    run: u64,
    reply: RpcReplyPort<Result<BatchReport, BatchError>>,
}

/// State for the batch actor.
pub struct BatchActorState {
    store: FileQueueStore,
    config: PipelineConfig,
    /// Only set between `StartBatch` and `BatchFinished`.
    active: Option<ActiveRun>,
    runs: u64,
    driver: Option<ActorRef<DriverMessage>>,
    event_tx: broadcast::Sender<BatchEvent>,
}

impl BatchActorState {
    pub fn new(config: PipelineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            store: FileQueueStore::new(),
            config,
            active: None,
            runs: 0,
            driver: None,
            event_tx,
        }
    }

    fn broadcast(&self, event: BatchEvent) {
        tracing::debug!("{}", event.description());
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn is_active_run(&self, run: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.run == run)
    }

    /// The entry the driver is working on. Leftovers of a stopped driver
    /// are not in flight once no run is active.
    fn in_flight(&self) -> Option<EntryId> {
        self.active.as_ref().and(self.store.processing_id())
    }

    fn is_in_flight(&self, entry_id: EntryId) -> bool {
        self.in_flight() == Some(entry_id)
    }
}

async fn spawn_driver(
    myself: &ActorRef<BatchMessage>,
    state: &mut BatchActorState,
) -> Result<ActorRef<DriverMessage>, ActorProcessingErr> {
    let args = DriverArgs {
        batch: myself.clone(),
        transform_timeout: state.config.transform_timeout(),
    };
    let (driver, _handle) = Actor::spawn_linked(None, DriverActor, args, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn driver: {}", e)))?;
    state.driver = Some(driver.clone());
    Ok(driver)
}

/// Actor that serializes every queue mutation.
pub struct BatchActor;

impl Actor for BatchActor {
    type Msg = BatchMessage;
    type State = BatchActorState;
    type Arguments = PipelineConfig;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting batch actor");
        let mut state = BatchActorState::new(args);
        spawn_driver(&myself, &mut state).await?;
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BatchMessage::AddFiles { files, reply } => {
                let ids = state.store.add_files(files);
                let entries = ids
                    .iter()
                    .filter_map(|id| state.store.get(*id))
                    .map(|e| e.summary())
                    .collect();
                state.broadcast(BatchEvent::EntriesAdded {
                    entries,
                    timestamp: Utc::now(),
                });
                let _ = reply.send(ids);
            }

            BatchMessage::RemoveFile { entry_id, reply } => {
                if state.is_in_flight(entry_id) {
                    let _ = reply.send(Err(QueueError::EntryProcessing(entry_id).into()));
                    return Ok(());
                }
                let removed = state.store.remove_file(entry_id).is_some();
                if removed {
                    state.broadcast(BatchEvent::EntryRemoved {
                        entry_id,
                        timestamp: Utc::now(),
                    });
                }
                let _ = reply.send(Ok(removed));
            }

            BatchMessage::Clear { reply } => {
                if let Some(busy) = state.in_flight() {
                    let _ = reply.send(Err(QueueError::EntryProcessing(busy).into()));
                    return Ok(());
                }
                let removed = state.store.clear();
                state.broadcast(BatchEvent::QueueCleared {
                    removed,
                    timestamp: Utc::now(),
                });
                let _ = reply.send(Ok(removed));
            }

            BatchMessage::StartBatch { transform, reply } => {
                if state.active.is_some() {
                    let _ = reply.send(Err(BatchError::AlreadyRunning));
                    return Ok(());
                }

                state.runs += 1;
                let run = state.runs;
                let entries = state.store.eligible_ids();
                if entries.is_empty() {
                    let _ = reply.send(Ok(BatchReport::empty(run)));
                    return Ok(());
                }

                let driver = match state.driver.clone() {
                    Some(driver) => driver,
                    None => spawn_driver(&myself, state).await?,
                };

                tracing::info!(
                    "Batch {} starting: {} entries with transform '{}'",
                    run,
                    entries.len(),
                    transform.name()
                );
                let scheduled = entries.len();
                if let Err(e) = driver.send_message(DriverMessage::Run {
                    run,
                    entries,
                    transform: Arc::clone(&transform),
                }) {
                    let _ = reply.send(Err(BatchError::Actor(e.to_string())));
                    return Ok(());
                }

                state.active = Some(ActiveRun { run, reply });
                state.broadcast(BatchEvent::BatchStarted {
                    run,
                    scheduled,
                    timestamp: Utc::now(),
                });
            }

            BatchMessage::BeginEntry {
                run,
                entry_id,
                position,
                reply,
            } => {
                if !state.is_active_run(run) {
                    let _ = reply.send(None);
                    return Ok(());
                }

                let eligible = state
                    .store
                    .get(entry_id)
                    .is_some_and(|e| e.kind().is_eligible());
                if !eligible {
                    state.broadcast(BatchEvent::EntrySkipped {
                        run,
                        entry_id,
                        timestamp: Utc::now(),
                    });
                    let _ = reply.send(None);
                    return Ok(());
                }

                let now = Utc::now();
                if let Err(e) = state
                    .store
                    .update_status(entry_id, EntryStatus::Processing { started_at: now })
                {
                    tracing::warn!("Failed to start entry {}: {}", entry_id, e);
                    let _ = reply.send(None);
                    return Ok(());
                }

                state.broadcast(BatchEvent::EntryStarted {
                    run,
                    entry_id,
                    position,
                    timestamp: now,
                });
                let source = state.store.get(entry_id).map(|e| e.source.clone());
                let _ = reply.send(source);
            }

            BatchMessage::FinishEntry {
                run,
                entry_id,
                started_at,
                outcome,
                reply,
            } => {
                let now = Utc::now();
                let event = match outcome {
                    Ok(result) => {
                        let output_name = result.output_name.clone().unwrap_or_else(|| {
                            state
                                .store
                                .get(entry_id)
                                .map(|e| e.name.clone())
                                .unwrap_or_default()
                        });
                        let size_bytes = result.size_bytes();
                        let status = EntryStatus::Done {
                            started_at,
                            finished_at: now,
                            result,
                        };
                        state.store.update_status(entry_id, status).map(|_| {
                            BatchEvent::EntryCompleted {
                                run,
                                entry_id,
                                output_name,
                                size_bytes,
                                duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
                                timestamp: now,
                            }
                        })
                    }
                    Err(error) => {
                        let message = error.message().to_string();
                        let status = EntryStatus::Error {
                            started_at,
                            failed_at: now,
                            message: message.clone(),
                        };
                        state.store.update_status(entry_id, status).map(|_| {
                            BatchEvent::EntryFailed {
                                run,
                                entry_id,
                                message,
                                timestamp: now,
                            }
                        })
                    }
                };

                match event {
                    Ok(event) => state.broadcast(event),
                    Err(e) => tracing::warn!("Failed to record outcome of {}: {}", entry_id, e),
                }
                let _ = reply.send(());
            }

            BatchMessage::BatchFinished { report } => {
                if !state.is_active_run(report.run) {
                    tracing::warn!("Ignoring finish of stale batch {}", report.run);
                    return Ok(());
                }
                if let Some(active) = state.active.take() {
                    tracing::info!(
                        "Batch {} finished in {}ms: {} done, {} failed, {} skipped",
                        report.run,
                        report.duration_ms,
                        report.done,
                        report.failed,
                        report.skipped
                    );
                    state.broadcast(BatchEvent::BatchFinished {
                        report: report.clone(),
                        timestamp: Utc::now(),
                    });
                    let _ = active.reply.send(Ok(report));
                }
            }

            BatchMessage::GetEntry { entry_id, reply } => {
                let _ = reply.send(state.store.get(entry_id).cloned());
            }

            BatchMessage::ListEntries { reply } => {
                let _ = reply.send(state.store.entries().to_vec());
            }

            BatchMessage::GetStats { reply } => {
                let _ = reply.send(state.store.stats());
            }

            BatchMessage::IsProcessing { reply } => {
                let _ = reply.send(state.active.is_some());
            }

            BatchMessage::Subscribe { reply } => {
                let _ = reply.send(state.event_tx.subscribe());
            }

            BatchMessage::Shutdown => {
                tracing::info!("Shutting down batch actor");
                if let Some(driver) = state.driver.take() {
                    driver.stop(None);
                }
                if let Some(active) = state.active.take() {
                    let _ = active
                        .reply
                        .send(Err(BatchError::DriverStopped("shutdown".into())));
                }
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (cell, reason) = match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                (cell, reason.unwrap_or_else(|| "terminated".to_string()))
            }
            SupervisionEvent::ActorFailed(cell, err) => (cell, err.to_string()),
            _ => return Ok(()),
        };

        let is_driver = state
            .driver
            .as_ref()
            .is_some_and(|driver| driver.get_id() == cell.get_id());
        if !is_driver {
            return Ok(());
        }

        tracing::warn!("Processing driver stopped: {}", reason);
        state.driver = None;

        if let Some(active) = state.active.take() {
            let stuck = state
                .store
                .entries()
                .iter()
                .filter(|e| e.kind() == StatusKind::Processing)
                .count();
            tracing::warn!(
                "Batch {} aborted, {} entries left processing",
                active.run,
                stuck
            );
            let _ = active.reply.send(Err(BatchError::DriverStopped(reason)));
        }

        if myself.get_status() == ractor::ActorStatus::Running {
            spawn_driver(&myself, state).await?;
        }
        Ok(())
    }
}

/// Start a batch actor with the given configuration.
pub async fn start_batch_actor(
    config: PipelineConfig,
) -> Result<(ActorRef<BatchMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, BatchActor, config).await
}
