//! Compiled, replayable graph artifacts.
//!
//! A [`CompiledGraph`] is a deep copy of a sealed capture graph, rewritten
//! into per-stream replay lanes wired together with private tokens. It holds
//! no reference to the source graph or to any token handle the application
//! used during capture, so destroying either never invalidates an instance.
//!
//! Replays are numbered: each append draws a fresh ordinal from an atomic
//! counter, and every private scoreboard point of that replay targets the
//! ordinal as its value. Overlapping replays of one instance therefore never
//! satisfy each other's waits.
//!
//! Lanes are private too: at instantiation every non-entry lane is assigned a
//! fresh stream of its own, so a replay occupies no queue the application (or
//! a sibling instance) submits to other than the append target itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::capture::GraphId;
use crate::node::NodeKind;
use crate::submit::{CommandPayload, StreamId, SubmissionBatch, SubmittedOp};
use crate::token::{SyncPoint, TokenId};

/// Unique identifier for a compiled graph.
///
/// Compiled-graph IDs are assigned sequentially by the engine and never
/// reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompiledGraphId(pub(crate) u64);

impl CompiledGraphId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for CompiledGraphId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CompiledGraphId({})", self.0)
    }
}

/// One operation in replay form.
///
/// Capture-time token references are gone: cross-stream edges have been
/// rewritten onto private tokens, and only the external-wait slot remains to
/// be filled with append-time parameters.
pub(crate) struct ReplayNode {
    /// Operation kind, kept for logging.
    pub kind: NodeKind,
    /// Opaque payload shared with the source graph's node.
    pub payload: Option<Arc<dyn CommandPayload>>,
    /// Private tokens this node waits on, one per incoming internal edge.
    pub internal_waits: Vec<TokenId>,
    /// Private tokens this node signals, one per outgoing internal edge.
    pub internal_signals: Vec<TokenId>,
    /// True if the captured node waited on a token with no in-graph signaler;
    /// the append-time wait list is spliced in here.
    pub external_wait: bool,
}

/// Replay-ordered operations of one participant stream.
pub(crate) struct ReplayLane {
    /// Stream the lane replays on. For non-entry lanes this is a private
    /// stream allocated at instantiation, never a capture-time stream; for
    /// the entry lane it is unused, since those operations are re-targeted
    /// onto the append target.
    pub stream: StreamId,
    /// True for the lane of the session-origin stream; its operations are
    /// re-targeted onto the append target at replay.
    pub entry: bool,
    /// Arena indices into the node list, capture order.
    pub nodes: Vec<u32>,
    /// Private token signaled by the lane's last operation.
    pub completion: TokenId,
}

/// Immutable, repeatedly replayable artifact produced by instantiation.
pub struct CompiledGraph {
    id: CompiledGraphId,
    source: GraphId,
    nodes: Vec<ReplayNode>,
    lanes: Vec<ReplayLane>,
    replays: AtomicU64,
}

impl CompiledGraph {
    pub(crate) fn new(
        id: CompiledGraphId,
        source: GraphId,
        nodes: Vec<ReplayNode>,
        lanes: Vec<ReplayLane>,
    ) -> Self {
        Self {
            id,
            source,
            nodes,
            lanes,
            replays: AtomicU64::new(0),
        }
    }

    /// Returns this instance's identifier.
    pub fn id(&self) -> CompiledGraphId {
        self.id
    }

    /// Returns the identifier the source graph had at instantiation time.
    ///
    /// Provenance only: the source graph may since have been destroyed.
    pub fn source(&self) -> GraphId {
        self.source
    }

    /// Returns true if the instance replays no operations.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of replayable operations.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns how many replays have been issued so far.
    pub fn replay_count(&self) -> u64 {
        self.replays.load(Ordering::SeqCst)
    }

    /// Draws the next replay ordinal (1-based).
    pub(crate) fn next_ordinal(&self) -> u64 {
        self.replays.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Materializes one replay as a single submission batch.
    ///
    /// `external_waits` gate every node whose captured wait had no in-graph
    /// signaler. `completion`, if present, is signaled by a collector
    /// operation on `target` once all lanes have finished.
    pub(crate) fn build_batch(
        &self,
        target: StreamId,
        ordinal: u64,
        external_waits: &[SyncPoint],
        completion: Option<SyncPoint>,
    ) -> SubmissionBatch {
        let mut ops = Vec::with_capacity(self.nodes.len() + 1);

        for lane in &self.lanes {
            let stream = if lane.entry { target } else { lane.stream };
            for (pos, &idx) in lane.nodes.iter().enumerate() {
                let node = &self.nodes[idx as usize];

                let mut waits: Vec<SyncPoint> = node
                    .internal_waits
                    .iter()
                    .map(|&token| SyncPoint {
                        token,
                        value: ordinal,
                    })
                    .collect();
                if node.external_wait {
                    waits.extend_from_slice(external_waits);
                }

                let mut signals: Vec<SyncPoint> = node
                    .internal_signals
                    .iter()
                    .map(|&token| SyncPoint {
                        token,
                        value: ordinal,
                    })
                    .collect();
                if pos + 1 == lane.nodes.len() {
                    signals.push(SyncPoint {
                        token: lane.completion,
                        value: ordinal,
                    });
                }

                tracing::trace!(
                    "replay_op: {} {} on {stream} ({} waits, {} signals)",
                    self.id,
                    node.kind.name(),
                    waits.len(),
                    signals.len(),
                );
                ops.push(SubmittedOp {
                    stream,
                    payload: node.payload.clone(),
                    waits,
                    signals,
                });
            }
        }

        if let Some(signal) = completion {
            // Collector: joins every lane before publishing the caller's
            // completion point. Present even for an empty instance, where it
            // signals immediately.
            let waits = self
                .lanes
                .iter()
                .map(|lane| SyncPoint {
                    token: lane.completion,
                    value: ordinal,
                })
                .collect();
            ops.push(SubmittedOp {
                stream: target,
                payload: None,
                waits,
                signals: vec![signal],
            });
        }

        SubmissionBatch { ops }
    }

    #[cfg(test)]
    pub(crate) fn lanes(&self) -> &[ReplayLane] {
        &self.lanes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;
    use crate::capture::CaptureGraph;
    use crate::compile;
    use crate::token::TokenId;

    const S0: StreamId = StreamId(1);
    const S1: StreamId = StreamId(2);
    const TARGET: StreamId = StreamId(9);
    const T: TokenId = TokenId(50);
    const EXT: TokenId = TokenId(51);

    /// Two-stream fork/join: S0 signals T, S1 waits T then signals T back,
    /// S0 joins. S1's first node also carries an external wait on EXT.
    fn fork_join() -> CompiledGraph {
        let mut g = CaptureGraph::new(GraphId(0));
        g.bind_origin(S0);
        g.record(S0, NodeKind::DispatchCompute, None, &[], Some(T))
            .unwrap();
        g.record(S1, NodeKind::CopyMemory, None, &[T, EXT], Some(T))
            .unwrap();
        g.record(S0, NodeKind::Barrier, None, &[T], None).unwrap();
        g.seal();
        compile::compile(&g, CompiledGraphId(0), &AtomicU64::new(1000), &AtomicU64::new(100))
            .unwrap()
    }

    // --- batch shape ---

    #[test]
    fn entry_lane_retargets_to_append_target() {
        let cg = fork_join();
        let batch = cg.build_batch(TARGET, 1, &[], None);
        assert_eq!(batch.len(), 3);
        // S0's two ops run on the target; S1's op runs on the instance's
        // private lane stream, never on S1 itself.
        assert_eq!(batch.ops[0].stream, TARGET);
        assert_eq!(batch.ops[1].stream, TARGET);
        assert_ne!(batch.ops[2].stream, S1);
        assert_ne!(batch.ops[2].stream, TARGET);
    }

    #[test]
    fn captured_token_handles_never_reach_replay() {
        let cg = fork_join();
        let batch = cg.build_batch(TARGET, 1, &[], None);
        for op in &batch.ops {
            for point in op.waits.iter().chain(op.signals.iter()) {
                assert_ne!(point.token, T);
                assert_ne!(point.token, EXT);
            }
        }
    }

    #[test]
    fn external_waits_spliced_into_flagged_nodes_only() {
        let cg = fork_join();
        let ext = SyncPoint {
            token: TokenId(7),
            value: 3,
        };
        let batch = cg.build_batch(TARGET, 1, &[ext], None);
        // Only S1's first op carried the external wait.
        let with_ext: Vec<usize> = batch
            .ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.waits.contains(&ext))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(with_ext, vec![2]);
    }

    #[test]
    fn collector_joins_all_lanes_then_signals_caller() {
        let cg = fork_join();
        let done = SyncPoint {
            token: TokenId(8),
            value: 1,
        };
        let batch = cg.build_batch(TARGET, 4, &[], Some(done));
        let collector = batch.ops.last().unwrap();
        assert_eq!(collector.stream, TARGET);
        assert!(collector.payload.is_none());
        assert_eq!(collector.signals, vec![done]);
        // One completion wait per lane, all at the replay ordinal.
        assert_eq!(collector.waits.len(), cg.lanes().len());
        assert!(collector.waits.iter().all(|w| w.value == 4));
    }

    // --- ordinals ---

    #[test]
    fn ordinals_are_one_based_and_monotonic() {
        let cg = fork_join();
        assert_eq!(cg.replay_count(), 0);
        assert_eq!(cg.next_ordinal(), 1);
        assert_eq!(cg.next_ordinal(), 2);
        assert_eq!(cg.replay_count(), 2);
    }

    #[test]
    fn private_points_target_the_replay_ordinal() {
        let cg = fork_join();
        let batch = cg.build_batch(TARGET, 7, &[], None);
        for op in &batch.ops {
            for point in op.waits.iter().chain(op.signals.iter()) {
                assert_eq!(point.value, 7);
            }
        }
    }

    // --- empty instance ---

    #[test]
    fn empty_instance_replays_to_collector_only() {
        let mut g = CaptureGraph::new(GraphId(1));
        g.bind_origin(S0);
        g.seal();
        let cg = compile::compile(&g, CompiledGraphId(1), &AtomicU64::new(1000), &AtomicU64::new(100))
            .unwrap();
        assert!(cg.is_empty());

        assert!(cg.build_batch(TARGET, 1, &[], None).is_empty());

        let done = SyncPoint {
            token: TokenId(8),
            value: 1,
        };
        let batch = cg.build_batch(TARGET, 2, &[], Some(done));
        assert_eq!(batch.len(), 1);
        assert!(batch.ops[0].waits.is_empty());
        assert_eq!(batch.ops[0].signals, vec![done]);
    }
}
