//! Encore Softdev - a software device for the capture/replay engine
//!
//! This crate implements [`encore_core::SubmitBackend`] entirely on the host:
//! buffers are plain byte vectors, dispatches are closures, and the token
//! scoreboard lives in a hash map. It exists to exercise the engine end to
//! end (and to serve as a reference for real backends), not to be fast.
//!
//! - [`SoftDevice`] - per-stream FIFO queues plus a token scoreboard
//! - [`HostBuffer`] - shared host memory
//! - [`CopyOp`] / [`FillOp`] / [`DispatchOp`] - the payloads the device
//!   understands
//!
//! # Example
//!
//! ```rust,ignore
//! use encore_softdev::{SoftDevice, HostBuffer, FillOp};
//!
//! let device = Arc::new(SoftDevice::new());
//! let engine = CaptureEngine::new(device.clone());
//! let buf = HostBuffer::zeroed(64);
//! let stream = engine.create_stream();
//! engine.append_fill(stream, Arc::new(FillOp { dst: buf.clone(), offset: 0, len: 64, byte: 0xFF }), &[], None)?;
//! assert_eq!(buf.snapshot()[0], 0xFF);
//! ```

pub mod buffer;
pub mod device;
pub mod payload;

// Re-export main types at crate root
pub use buffer::HostBuffer;
pub use device::SoftDevice;
pub use payload::{CopyOp, DispatchOp, FillOp};
