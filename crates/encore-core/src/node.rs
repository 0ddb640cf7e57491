//! Captured command nodes.
//!
//! Each operation recorded during a capture session becomes a [`Node`] in the
//! owning [`CaptureGraph`](crate::CaptureGraph). Nodes live in an
//! index-addressed arena; all edges between them are integer index pairs,
//! never pointers, which keeps cycle detection and bulk teardown trivial.

use std::sync::Arc;

use crate::submit::{CommandPayload, StreamId};
use crate::token::TokenRef;

/// Unique identifier for a node within one capture graph.
///
/// Node IDs are arena indices: assigned sequentially, never reused within a
/// graph, and stable for the graph's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw arena index.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// The operation a node was captured from.
///
/// A closed set: one case per append-style operation kind. Payload-bearing
/// kinds carry only an opaque, device-ready description; the compiler and
/// replayer never inspect kind-specific content, they operate generically
/// over "has waits / has signal / has payload".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Compute kernel dispatch.
    DispatchCompute,
    /// Memory-to-memory copy.
    CopyMemory,
    /// Pattern fill of a memory range.
    FillMemory,
    /// Execution barrier within the owning stream.
    Barrier,
    /// Pure wait on one or more tokens.
    WaitTokens,
    /// Pure signal of a token.
    SignalToken,
}

impl NodeKind {
    /// Short lowercase name, used in logs and DOT exports.
    pub const fn name(self) -> &'static str {
        match self {
            NodeKind::DispatchCompute => "dispatch",
            NodeKind::CopyMemory => "copy",
            NodeKind::FillMemory => "fill",
            NodeKind::Barrier => "barrier",
            NodeKind::WaitTokens => "wait",
            NodeKind::SignalToken => "signal",
        }
    }
}

/// One captured operation.
pub struct Node {
    /// Arena identifier of this node.
    pub id: NodeId,
    /// Which operation kind was captured.
    pub kind: NodeKind,
    /// Stream the operation was appended to.
    pub stream: StreamId,
    /// Opaque hardware-submission payload, present for payload-bearing kinds.
    pub payload: Option<Arc<dyn CommandPayload>>,
    /// Tokens this node waits on, each bound to the generation current at
    /// record time. Generation 0 entries are external waits.
    pub waits: Vec<TokenRef>,
    /// Token this node signals, bound to the generation it produced.
    pub signal: Option<TokenRef>,
    /// Capture-time sequence index within the owning stream.
    pub seq: u32,
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream", &self.stream)
            .field("has_payload", &self.payload.is_some())
            .field("waits", &self.waits)
            .field("signal", &self.signal)
            .field("seq", &self.seq)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(NodeKind::DispatchCompute.name(), "dispatch");
        assert_eq!(NodeKind::CopyMemory.name(), "copy");
        assert_eq!(NodeKind::FillMemory.name(), "fill");
        assert_eq!(NodeKind::Barrier.name(), "barrier");
        assert_eq!(NodeKind::WaitTokens.name(), "wait");
        assert_eq!(NodeKind::SignalToken.name(), "signal");
    }
}
