//! Error types for the capture/replay engine.

use thiserror::Error;

use crate::capture::GraphId;
use crate::compiled::CompiledGraphId;
use crate::submit::{StreamId, SubmitError};
use crate::token::TokenId;

/// Errors that can occur during capture, compilation, and replay.
#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// An extension descriptor was supplied where none is recognized.
    #[error("unrecognized extension descriptor")]
    UnrecognizedExtension,

    /// The stream handle does not name a live stream.
    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    /// The graph handle does not name a live capture graph.
    #[error("unknown capture graph: {0}")]
    UnknownGraph(GraphId),

    /// The compiled-graph handle does not name a live compiled graph.
    #[error("unknown compiled graph: {0}")]
    UnknownCompiledGraph(CompiledGraphId),

    /// The token handle does not name a live token.
    #[error("unknown token: {0}")]
    UnknownToken(TokenId),

    /// A destiny graph supplied at begin-capture is already sealed.
    #[error("capture graph {0} is already sealed")]
    GraphSealed(GraphId),

    /// Begin-capture on a stream that already has an active session.
    #[error("stream {0} is already recording")]
    AlreadyRecording(StreamId),

    /// End-capture on a stream with no active session of its own.
    #[error("stream {0} is not recording")]
    NotRecording(StreamId),

    /// Instantiate was given a graph that is still open for recording.
    #[error("source graph {0} is not sealed")]
    SourceGraphNotSealed(GraphId),

    /// The captured node/edge structure contains a dependency cycle.
    #[error("capture graph contains a dependency cycle")]
    CycleDetected,

    /// A wait references a token generation with no recorded signaler.
    #[error("wait on {token} generation {generation} has no matching signal")]
    DanglingWait {
        /// The waited token.
        token: TokenId,
        /// The generation the wait was bound to.
        generation: u32,
    },

    /// The operation is reserved and not available in this contract.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    /// Failure propagated unchanged from the submission collaborator.
    #[error(transparent)]
    Submission(#[from] SubmitError),
}

/// Coarse classification of an [`Error`], matching the engine's taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Null/unknown-handle mismatches, malformed descriptors, forbidden
    /// extension values.
    Argument,
    /// Recording exclusivity violations and seal-state mismatches.
    State,
    /// Structural defects detected by the compiler.
    GraphValidity,
    /// Reserved operations.
    Unsupported,
    /// Backend failures.
    Submission,
}

impl Error {
    /// Returns the taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_)
            | Error::UnrecognizedExtension
            | Error::UnknownStream(_)
            | Error::UnknownGraph(_)
            | Error::UnknownCompiledGraph(_)
            | Error::UnknownToken(_)
            | Error::GraphSealed(_) => ErrorKind::Argument,
            Error::AlreadyRecording(_)
            | Error::NotRecording(_)
            | Error::SourceGraphNotSealed(_) => ErrorKind::State,
            Error::CycleDetected | Error::DanglingWait { .. } => ErrorKind::GraphValidity,
            Error::UnsupportedFeature(_) => ErrorKind::Unsupported,
            Error::Submission(_) => ErrorKind::Submission,
        }
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
