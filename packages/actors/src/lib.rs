//! Actor system for the batch file pipeline.
//!
//! This crate provides the Ractor-based actors that own the file queue,
//! drive transforms over it, and deliver finished results.
//!
//! # Architecture
//!
//! - `BatchActor` - Owns the queue store and the active-run guard
//! - `DriverActor` - Applies a transform to a snapshot, one entry at a time
//! - `ResultDispatcher` - Saves finished results to a download sink
//!
//! # Usage
//!
//! ```ignore
//! use actors::{BatchHandle, PipelineConfig, SourceFile};
//!
//! let (batch, _join) = BatchHandle::start(PipelineConfig::default()).await?;
//! batch.add_files(vec![SourceFile::new("a.png", bytes)]).await?;
//! let report = batch.run_batch(transform).await?;
//! ```

mod batch_actor;
mod dispatcher;
mod driver_actor;
mod handle;
mod messages;
mod transform;

pub use batch_actor::{BatchActor, start_batch_actor};
pub use dispatcher::{
    DispatchError, DownloadFailure, DownloadReport, DownloadSink, ResultDispatcher, SinkFuture,
    download_file_name,
};
pub use driver_actor::DriverActor;
pub use handle::BatchHandle;
pub use messages::{BatchError, BatchMessage, DriverMessage};
pub use transform::{
    FALLBACK_ERROR_MESSAGE, FnTransform, Transform, TransformError, TransformFuture,
    TransformRegistry, TransformResult, UnknownTransform,
};

/// Re-export core types used in transform signatures.
pub use batch_core::{PipelineConfig, ResultPayload, SourceFile};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
