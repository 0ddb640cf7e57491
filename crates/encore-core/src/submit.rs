//! Submission boundary toward the hardware backend.
//!
//! Everything below this interface — command encoding, residency, the kernel
//! driver — is an external collaborator. The engine hands the backend flat
//! [`SubmissionBatch`]es of opaque payloads plus resolved synchronization
//! points and never looks inside a payload itself.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::token::SyncPoint;

/// Unique identifier for a command stream.
///
/// Stream IDs are assigned sequentially by the engine and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for StreamId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

/// Opaque, device-ready description of one operation.
///
/// Produced by the hardware-encoding collaborator and interpreted only by the
/// backend it was built for. The engine stores payloads behind `Arc` and
/// shares them freely: a payload is an immutable description, so sharing
/// carries no mutable state between compiled-graph instances.
pub trait CommandPayload: core::fmt::Debug + Send + Sync + 'static {
    /// Downcast hook for the owning backend.
    fn as_any(&self) -> &dyn Any;
}

/// One operation inside a submission batch.
///
/// Waits and signals are fully resolved scoreboard points; the backend needs
/// no knowledge of capture-time generations or private-token provenance.
#[derive(Debug, Clone)]
pub struct SubmittedOp {
    /// Stream the operation executes on.
    pub stream: StreamId,
    /// Opaque payload to execute, if the operation does device work.
    pub payload: Option<Arc<dyn CommandPayload>>,
    /// Scoreboard points that must be reached before execution.
    pub waits: Vec<SyncPoint>,
    /// Scoreboard points published after execution completes.
    pub signals: Vec<SyncPoint>,
}

/// A flat list of operations enqueued as one atomic unit.
///
/// Ops sharing a stream execute in list order on that stream; ordering across
/// streams exists only through the wait/signal points.
#[derive(Debug, Default)]
pub struct SubmissionBatch {
    /// Operations in submission order.
    pub ops: Vec<SubmittedOp>,
}

impl SubmissionBatch {
    /// Returns true if the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Errors surfaced by the submission collaborator.
///
/// Opaque to the engine: these propagate unchanged through every operation
/// that reaches the backend.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The device was lost or reset.
    #[error("device lost")]
    DeviceLost,
    /// The backend could not allocate resources for the submission.
    #[error("out of device memory")]
    OutOfMemory,
    /// The backend does not understand a payload it was handed.
    #[error("rejected payload: {0}")]
    RejectedPayload(&'static str),
}

/// Low-level submission collaborator.
///
/// `submit` must be non-blocking: it enqueues the batch and returns; actual
/// execution is asynchronous and observed only through tokens.
pub trait SubmitBackend: Send + Sync {
    /// Enqueues `batch` as one atomic unit, entry-anchored on `target`.
    fn submit(&self, target: StreamId, batch: SubmissionBatch) -> Result<(), SubmitError>;
}
