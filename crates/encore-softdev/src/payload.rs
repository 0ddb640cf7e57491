//! Host-executable command payloads.
//!
//! These are the "device-ready" operation descriptions the software device
//! understands. The engine never looks inside them; the device downcasts via
//! [`CommandPayload::as_any`] and executes on host memory.

use std::any::Any;
use std::sync::Arc;

use encore_core::CommandPayload;

use crate::buffer::HostBuffer;

/// Buffer-to-buffer copy.
#[derive(Clone, Debug)]
pub struct CopyOp {
    /// Source buffer.
    pub src: HostBuffer,
    /// Byte offset into the source.
    pub src_offset: usize,
    /// Destination buffer.
    pub dst: HostBuffer,
    /// Byte offset into the destination.
    pub dst_offset: usize,
    /// Number of bytes to copy.
    pub len: usize,
}

impl CopyOp {
    pub(crate) fn execute(&self) {
        let bytes = self.src.read(self.src_offset, self.len);
        self.dst.write(self.dst_offset, &bytes);
    }
}

impl CommandPayload for CopyOp {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Constant fill of a buffer range.
#[derive(Clone, Debug)]
pub struct FillOp {
    /// Destination buffer.
    pub dst: HostBuffer,
    /// Byte offset into the destination.
    pub offset: usize,
    /// Number of bytes to fill.
    pub len: usize,
    /// Fill byte.
    pub byte: u8,
}

impl FillOp {
    pub(crate) fn execute(&self) {
        self.dst.fill(self.offset, self.len, self.byte);
    }
}

impl CommandPayload for FillOp {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Arbitrary host kernel, standing in for a compute dispatch.
#[derive(Clone)]
pub struct DispatchOp {
    /// Kernel name, for logs.
    pub name: &'static str,
    kernel: Arc<dyn Fn() + Send + Sync>,
}

impl DispatchOp {
    /// Wraps a host closure as a dispatchable kernel.
    pub fn new(name: &'static str, kernel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            name,
            kernel: Arc::new(kernel),
        }
    }

    pub(crate) fn execute(&self) {
        (self.kernel)();
    }
}

impl core::fmt::Debug for DispatchOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DispatchOp").field("name", &self.name).finish()
    }
}

impl CommandPayload for DispatchOp {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn copy_moves_bytes() {
        let src = HostBuffer::from_bytes([1, 2, 3, 4]);
        let dst = HostBuffer::zeroed(4);
        CopyOp {
            src,
            src_offset: 1,
            dst: dst.clone(),
            dst_offset: 0,
            len: 2,
        }
        .execute();
        assert_eq!(dst.snapshot(), vec![2, 3, 0, 0]);
    }

    #[test]
    fn fill_writes_pattern() {
        let dst = HostBuffer::zeroed(3);
        FillOp {
            dst: dst.clone(),
            offset: 0,
            len: 3,
            byte: 9,
        }
        .execute();
        assert_eq!(dst.snapshot(), vec![9, 9, 9]);
    }

    #[test]
    fn dispatch_runs_the_kernel() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let op = DispatchOp::new("count", move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        op.execute();
        op.execute();
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }
}
