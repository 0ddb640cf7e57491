//! Encore Core - capture, compile, and replay of command sequences
//!
//! This crate records operations appended to command streams into a
//! dependency graph, compiles the sealed graph into an immutable artifact,
//! and resubmits that artifact repeatedly without re-recording.
//!
//! # Core Abstractions
//!
//! ## Capture
//!
//! - [`CaptureEngine`] - Engine façade owning every handle table
//! - [`CaptureGraph`] - Mutable-then-sealed DAG of recorded operations
//! - [`RecordingRegistry`] - Per-stream session exclusivity
//!
//! Recording is session-based: [`CaptureEngine::begin_capture`] redirects a
//! stream's appends into a graph instead of the device, and a wait on a token
//! signaled inside an active session forks the waiting stream into it.
//! [`CaptureEngine::end_capture`] seals the graph.
//!
//! ## Compile and Replay
//!
//! - [`CompiledGraph`] - Immutable replayable instance, independent of its
//!   source graph and of every capture-time token handle
//! - [`CaptureEngine::instantiate`] - Validation plus replay synthesis
//! - [`CaptureEngine::append_compiled`] - One replay, one atomic submission
//!
//! ## Submission Boundary
//!
//! - [`SubmitBackend`] - The device-facing collaborator
//! - [`SubmissionBatch`] / [`SubmittedOp`] - Flat, fully resolved replay form
//! - [`CommandPayload`] - Opaque device-ready operation description
//!
//! # Example
//!
//! ```rust,ignore
//! use encore_core::{CaptureEngine, Extension, TokenKind};
//!
//! let engine = CaptureEngine::new(backend);
//! let stream = engine.create_stream();
//! let token = engine.create_token(TokenKind::Counter);
//!
//! // Record once.
//! engine.begin_capture(stream, Extension::None)?;
//! engine.append_dispatch(stream, kernel, &[], Some(token))?;
//! engine.append_barrier(stream, &[token], None)?;
//! let graph = engine.end_capture(stream, Extension::None)?;
//!
//! // Replay many times.
//! let compiled = engine.instantiate(graph, Extension::None)?;
//! for _ in 0..16 {
//!     engine.append_compiled(stream, compiled, Extension::None, &[], None)?;
//! }
//! ```
//!
//! # Design Principles
//!
//! - **Record-or-submit, never both**: an append is captured or executed,
//!   decided once per call
//! - **Instance independence**: destroying the source graph or its tokens
//!   never invalidates a compiled instance
//! - **Private synchronization**: replays run entirely on synthesized tokens;
//!   overlapping replays cannot satisfy each other's waits

pub mod capture;
mod compile;
pub mod compiled;
pub mod engine;
pub mod error;
pub mod export;
pub mod ext;
pub mod node;
pub mod registry;
pub mod submit;
pub mod token;

// Re-export main types at crate root
pub use capture::{CaptureGraph, GraphId};
pub use compiled::{CompiledGraph, CompiledGraphId};
pub use engine::CaptureEngine;
pub use error::{Error, ErrorKind, Result};
pub use export::{DumpMode, dot_string, write_dot};
pub use ext::Extension;
pub use node::{Node, NodeId, NodeKind};
pub use registry::RecordingRegistry;
pub use submit::{
    CommandPayload, StreamId, SubmissionBatch, SubmitBackend, SubmitError, SubmittedOp,
};
pub use token::{SyncPoint, TokenId, TokenKind, TokenRef};
