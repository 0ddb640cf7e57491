//! Graph compilation: validation plus replay synthesis.
//!
//! Compilation happens at instantiation time, not at seal. It walks the
//! sealed capture graph once to check structural validity (no dependency
//! cycles, no wait bound to a generation nothing signals) and then deep-copies
//! the nodes into [`CompiledGraph`] replay lanes, allocating one private
//! token per internal edge and one completion token per lane. Private tokens
//! draw from the engine's token ID counter, so they can never collide with a
//! handle the application holds.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::capture::CaptureGraph;
use crate::compiled::{CompiledGraph, CompiledGraphId, ReplayLane, ReplayNode};
use crate::error::{Error, Result};
use crate::submit::StreamId;
use crate::token::TokenId;

/// Checks a sealed capture graph for structural defects.
///
/// Edges considered are the per-stream capture order plus every wait bound to
/// an in-graph signal. The walk is an iterative three-color DFS over arena
/// indices.
///
/// # Errors
///
/// Returns [`Error::DanglingWait`] if a wait references a generation with no
/// recorded signaler, or [`Error::CycleDetected`] if the edges form a cycle.
pub(crate) fn validate(graph: &CaptureGraph) -> Result<()> {
    let successors = successor_lists(graph)?;

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color = vec![Color::White; successors.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..successors.len() {
        if color[root] != Color::White {
            continue;
        }
        color[root] = Color::Gray;
        stack.push((root, 0));
        while let Some(&mut (node, ref mut next)) = stack.last_mut() {
            if *next < successors[node].len() {
                let succ = successors[node][*next];
                *next += 1;
                match color[succ] {
                    Color::White => {
                        color[succ] = Color::Gray;
                        stack.push((succ, 0));
                    }
                    Color::Gray => return Err(Error::CycleDetected),
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                stack.pop();
            }
        }
    }

    Ok(())
}

/// Deep-copies a validated graph into a replayable artifact.
///
/// Each internal edge becomes a private token; each lane gets a private
/// completion token signaled by its last operation. Non-entry lanes also get
/// a fresh private stream each, so replays never share a FIFO with the
/// capture-time streams or with lanes of sibling instances: the only queue a
/// replay touches that the caller can observe is the append target itself.
/// `next_token` and `next_stream` are the engine's ID counters.
pub(crate) fn compile(
    graph: &CaptureGraph,
    id: CompiledGraphId,
    next_token: &AtomicU64,
    next_stream: &AtomicU64,
) -> Result<CompiledGraph> {
    validate(graph)?;

    let alloc = || TokenId(next_token.fetch_add(1, Ordering::Relaxed));

    let mut nodes: Vec<ReplayNode> = graph
        .nodes()
        .iter()
        .map(|node| ReplayNode {
            kind: node.kind,
            payload: node.payload.clone(),
            internal_waits: Vec::new(),
            internal_signals: Vec::new(),
            external_wait: node.waits.iter().any(|w| w.is_external()),
        })
        .collect();

    for node in graph.nodes() {
        for wait in node.waits.iter().filter(|w| !w.is_external()) {
            let signaler = graph
                .signaler_of(*wait)
                .ok_or(Error::DanglingWait {
                    token: wait.token,
                    generation: wait.generation,
                })?;
            let edge = alloc();
            nodes[signaler.index() as usize].internal_signals.push(edge);
            nodes[node.id.index() as usize].internal_waits.push(edge);
        }
    }

    let lanes: Vec<ReplayLane> = graph
        .participant_streams()
        .iter()
        .map(|&stream| {
            let entry = graph.origin() == Some(stream);
            ReplayLane {
                stream: if entry {
                    stream
                } else {
                    StreamId(next_stream.fetch_add(1, Ordering::Relaxed))
                },
                entry,
                nodes: graph.stream_nodes(stream).iter().map(|n| n.index()).collect(),
                completion: alloc(),
            }
        })
        .collect();

    tracing::debug!(
        "compile: {} from {} ({} nodes, {} lanes)",
        id,
        graph.id(),
        nodes.len(),
        lanes.len(),
    );
    Ok(CompiledGraph::new(id, graph.id(), nodes, lanes))
}

/// Builds per-node successor lists: stream order plus token edges.
fn successor_lists(graph: &CaptureGraph) -> Result<Vec<Vec<usize>>> {
    let mut successors = vec![Vec::new(); graph.node_count()];

    for &stream in graph.participant_streams() {
        for pair in graph.stream_nodes(stream).windows(2) {
            successors[pair[0].index() as usize].push(pair[1].index() as usize);
        }
    }

    for node in graph.nodes() {
        for wait in node.waits.iter().filter(|w| !w.is_external()) {
            let signaler = graph
                .signaler_of(*wait)
                .ok_or(Error::DanglingWait {
                    token: wait.token,
                    generation: wait.generation,
                })?;
            successors[signaler.index() as usize].push(node.id.index() as usize);
        }
    }

    Ok(successors)
}
