//! Mutable-then-sealed capture graphs.
//!
//! A [`CaptureGraph`] accumulates [`Node`]s while a recording session is
//! open, tracking per-token generations so a reused token handle still binds
//! every wait to the specific signal that preceded it. Sealing freezes the
//! graph; afterwards it can only be compiled or inspected.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::node::{Node, NodeId, NodeKind};
use crate::submit::{CommandPayload, StreamId};
use crate::token::{TokenId, TokenRef};

/// Unique identifier for a capture graph.
///
/// Graph IDs are assigned sequentially by the engine and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphId(pub(crate) u64);

impl GraphId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for GraphId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "GraphId({})", self.0)
    }
}

/// Per-token capture state: how often it has been signaled and by whom.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TokenState {
    /// Number of signals recorded for the token in this graph.
    pub generation: u32,
    /// Node that produced the most recent signal.
    pub last_signaler: Option<NodeId>,
}

/// DAG recorded from one or more command streams during a recording session.
///
/// Nodes live in an index-addressed arena; per-stream order lists keep the
/// capture sequence, and the token table keeps generation history. Mutation
/// is only possible while the graph is unsealed.
pub struct CaptureGraph {
    id: GraphId,
    nodes: Vec<Node>,
    /// Participant streams in the order they first appended a node.
    streams: Vec<StreamId>,
    /// Per-stream node order, capture sequence.
    per_stream: HashMap<StreamId, Vec<NodeId>>,
    tokens: HashMap<TokenId, TokenState>,
    /// Stream whose explicit begin-capture opened the session, once bound.
    origin: Option<StreamId>,
    sealed: bool,
}

impl CaptureGraph {
    /// Creates an empty, unsealed capture graph.
    pub(crate) fn new(id: GraphId) -> Self {
        Self {
            id,
            nodes: Vec::new(),
            streams: Vec::new(),
            per_stream: HashMap::new(),
            tokens: HashMap::new(),
            origin: None,
            sealed: false,
        }
    }

    /// Returns this graph's identifier.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Returns the stream that opened this graph's recording session.
    pub fn origin(&self) -> Option<StreamId> {
        self.origin
    }

    /// Binds the session origin the first time a stream begins capture here.
    pub(crate) fn bind_origin(&mut self, stream: StreamId) {
        if self.origin.is_none() {
            self.origin = Some(stream);
        }
    }

    /// Returns true once the graph has been sealed by end-capture.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Returns true if no node has been recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of recorded nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node arena.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the participant streams in first-append order.
    ///
    /// Every stream that appended at least one node during the session is a
    /// participant, whether or not it opened the session itself.
    pub fn participant_streams(&self) -> &[StreamId] {
        &self.streams
    }

    /// Returns the capture-ordered node list for one participant stream.
    pub fn stream_nodes(&self, stream: StreamId) -> &[NodeId] {
        self.per_stream.get(&stream).map_or(&[], |v| v.as_slice())
    }

    /// Returns the current generation of a token (0 if never signaled here).
    pub fn generation(&self, token: TokenId) -> u32 {
        self.tokens.get(&token).map_or(0, |s| s.generation)
    }

    /// Returns true if the token has been signaled within this graph.
    ///
    /// This is the fork-detection predicate: a wait on such a token from a
    /// non-recording stream pulls that stream into the session.
    pub(crate) fn has_signaled(&self, token: TokenId) -> bool {
        self.generation(token) > 0
    }

    /// Returns the node that recorded the given signal, if any.
    pub(crate) fn signaler_of(&self, reference: TokenRef) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.signal == Some(reference))
            .map(|n| n.id)
    }

    /// Records one captured operation.
    ///
    /// Waits bind to each token's current generation; a signal advances its
    /// token's generation and marks this node as the latest signaler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphSealed`] if the graph is no longer recording.
    pub(crate) fn record(
        &mut self,
        stream: StreamId,
        kind: NodeKind,
        payload: Option<Arc<dyn CommandPayload>>,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<NodeId> {
        if self.sealed {
            return Err(Error::GraphSealed(self.id));
        }

        let id = NodeId(self.nodes.len() as u32);

        let wait_refs: Vec<TokenRef> = waits
            .iter()
            .map(|&token| TokenRef {
                token,
                generation: self.generation(token),
            })
            .collect();

        let signal_ref = signal.map(|token| {
            let state = self.tokens.entry(token).or_default();
            state.generation += 1;
            state.last_signaler = Some(id);
            TokenRef {
                token,
                generation: state.generation,
            }
        });

        if !self.per_stream.contains_key(&stream) {
            self.streams.push(stream);
            self.per_stream.insert(stream, Vec::new());
        }
        let order = self
            .per_stream
            .get_mut(&stream)
            .unwrap_or_else(|| unreachable!("participant entry inserted above"));
        let seq = order.len() as u32;
        order.push(id);

        tracing::trace!(
            "graph_record: {} node {id} on {stream} (seq {seq}, {} waits, signal {:?})",
            kind.name(),
            wait_refs.len(),
            signal_ref,
        );

        self.nodes.push(Node {
            id,
            kind,
            stream,
            payload,
            waits: wait_refs,
            signal: signal_ref,
            seq,
        });

        Ok(id)
    }

    /// Seals the graph; all further mutation is rejected.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
        tracing::debug!(
            "graph_seal: {} with {} nodes across {} streams",
            self.id,
            self.nodes.len(),
            self.streams.len()
        );
    }

    /// Test/compiler hook: push a fully-formed node without token bookkeeping.
    #[cfg(test)]
    pub(crate) fn push_raw(&mut self, node: Node) {
        if !self.per_stream.contains_key(&node.stream) {
            self.streams.push(node.stream);
        }
        self.per_stream.entry(node.stream).or_default().push(node.id);
        self.nodes.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> CaptureGraph {
        CaptureGraph::new(GraphId(0))
    }

    const S0: StreamId = StreamId(10);
    const S1: StreamId = StreamId(11);
    const T: TokenId = TokenId(100);

    // --- recording ---

    #[test]
    fn record_assigns_sequential_ids_and_seq() {
        let mut g = graph();
        let a = g.record(S0, NodeKind::Barrier, None, &[], None).unwrap();
        let b = g.record(S0, NodeKind::Barrier, None, &[], None).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(g.nodes()[0].seq, 0);
        assert_eq!(g.nodes()[1].seq, 1);
        assert_eq!(g.stream_nodes(S0), &[a, b]);
    }

    #[test]
    fn participants_in_first_append_order() {
        let mut g = graph();
        g.record(S1, NodeKind::Barrier, None, &[], None).unwrap();
        g.record(S0, NodeKind::Barrier, None, &[], None).unwrap();
        g.record(S1, NodeKind::Barrier, None, &[], None).unwrap();
        assert_eq!(g.participant_streams(), &[S1, S0]);
    }

    #[test]
    fn sealed_graph_rejects_record() {
        let mut g = graph();
        g.seal();
        let err = g.record(S0, NodeKind::Barrier, None, &[], None).unwrap_err();
        assert!(matches!(err, Error::GraphSealed(_)));
        assert!(g.is_empty());
    }

    // --- token generations ---

    #[test]
    fn wait_before_any_signal_is_external() {
        let mut g = graph();
        let n = g.record(S0, NodeKind::WaitTokens, None, &[T], None).unwrap();
        let node = &g.nodes()[n.index() as usize];
        assert_eq!(node.waits.len(), 1);
        assert!(node.waits[0].is_external());
    }

    #[test]
    fn signal_advances_generation_and_wait_binds_to_it() {
        let mut g = graph();
        let s = g.record(S0, NodeKind::SignalToken, None, &[], Some(T)).unwrap();
        assert_eq!(g.generation(T), 1);

        let w = g.record(S1, NodeKind::Barrier, None, &[T], None).unwrap();
        let wait = g.nodes()[w.index() as usize].waits[0];
        assert_eq!(wait, TokenRef { token: T, generation: 1 });
        assert_eq!(g.signaler_of(wait), Some(s));
    }

    #[test]
    fn reused_handle_binds_each_wait_to_preceding_signal() {
        // Chain: signal g1, wait g1, signal g2, wait g2 — one token handle.
        let mut g = graph();
        let s1 = g.record(S0, NodeKind::Barrier, None, &[], Some(T)).unwrap();
        let w1 = g.record(S1, NodeKind::Barrier, None, &[T], None).unwrap();
        let s2 = g.record(S1, NodeKind::Barrier, None, &[], Some(T)).unwrap();
        let w2 = g.record(S0, NodeKind::Barrier, None, &[T], None).unwrap();

        let wait1 = g.nodes()[w1.index() as usize].waits[0];
        let wait2 = g.nodes()[w2.index() as usize].waits[0];
        assert_eq!(wait1.generation, 1);
        assert_eq!(wait2.generation, 2);
        assert_eq!(g.signaler_of(wait1), Some(s1));
        assert_eq!(g.signaler_of(wait2), Some(s2));
    }

    #[test]
    fn has_signaled_tracks_graph_scope_only() {
        let mut g = graph();
        assert!(!g.has_signaled(T));
        g.record(S0, NodeKind::SignalToken, None, &[], Some(T)).unwrap();
        assert!(g.has_signaled(T));
    }

    // --- seal ---

    #[test]
    fn seal_is_observable() {
        let mut g = graph();
        assert!(!g.is_sealed());
        g.seal();
        assert!(g.is_sealed());
    }
}
