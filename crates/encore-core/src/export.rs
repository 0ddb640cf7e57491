//! Graphviz DOT export of capture graphs.
//!
//! Debug tooling behind [`CaptureEngine::debug_dot`], and the rendering the
//! reserved dump operation will use once it is activated. Nodes are grouped
//! into one cluster per participant stream; solid edges are stream order and
//! in-graph token dependencies, dashed edges are external waits resolved only
//! at append time.
//!
//! [`CaptureEngine::debug_dot`]: crate::CaptureEngine::debug_dot

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use crate::capture::CaptureGraph;
use crate::node::Node;
use crate::token::TokenId;

/// Level of detail of a DOT rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DumpMode {
    /// Operation kinds only.
    #[default]
    Concise,
    /// Kinds plus sequence numbers and token bindings.
    Detailed,
}

/// Renders a capture graph as DOT text.
pub fn dot_string(graph: &CaptureGraph, mode: DumpMode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph capture_{} {{", graph.id().index());
    let _ = writeln!(out, "  rankdir=TB;");
    let _ = writeln!(out, "  node [shape=box, style=filled, fillcolor=lightgrey];");

    for &stream in graph.participant_streams() {
        let _ = writeln!(out, "  subgraph cluster_{} {{", stream.index());
        let _ = writeln!(out, "    label=\"{stream}\";");
        for &node in graph.stream_nodes(stream) {
            let n = &graph.nodes()[node.index() as usize];
            let _ = writeln!(out, "    n{} [label=\"{}\"];", n.id.index(), node_label(n, mode));
        }
        let _ = writeln!(out, "  }}");
    }

    // Stream order.
    for &stream in graph.participant_streams() {
        for pair in graph.stream_nodes(stream).windows(2) {
            let _ = writeln!(out, "  n{} -> n{};", pair[0].index(), pair[1].index());
        }
    }

    // Token edges; external waits hang off dashed placeholder nodes.
    let mut externals: BTreeSet<TokenId> = BTreeSet::new();
    for node in graph.nodes() {
        for wait in &node.waits {
            if wait.is_external() {
                externals.insert(wait.token);
            } else if let Some(signaler) = graph.signaler_of(*wait) {
                let _ = writeln!(
                    out,
                    "  n{} -> n{} [label=\"{}#{}\"];",
                    signaler.index(),
                    node.id.index(),
                    wait.token,
                    wait.generation,
                );
            }
        }
    }
    for token in &externals {
        let _ = writeln!(
            out,
            "  x{} [label=\"{token}\", shape=ellipse, style=dashed];",
            token.index(),
        );
    }
    for node in graph.nodes() {
        for wait in node.waits.iter().filter(|w| w.is_external()) {
            let _ = writeln!(
                out,
                "  x{} -> n{} [style=dashed];",
                wait.token.index(),
                node.id.index(),
            );
        }
    }

    let _ = writeln!(out, "}}");
    out
}

/// Renders a capture graph to a file at `path`.
///
/// # Errors
///
/// Propagates filesystem errors from the write.
pub fn write_dot(graph: &CaptureGraph, path: &Path, mode: DumpMode) -> std::io::Result<()> {
    std::fs::write(path, dot_string(graph, mode))
}

fn node_label(node: &Node, mode: DumpMode) -> String {
    match mode {
        DumpMode::Concise => node.kind.name().to_owned(),
        DumpMode::Detailed => {
            let mut label = format!("{} #{}", node.kind.name(), node.seq);
            for wait in &node.waits {
                let _ = write!(label, "\\nwait {}#{}", wait.token, wait.generation);
            }
            if let Some(signal) = node.signal {
                let _ = write!(label, "\\nsignal {}#{}", signal.token, signal.generation);
            }
            label
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::GraphId;
    use crate::node::NodeKind;
    use crate::submit::StreamId;

    const S0: StreamId = StreamId(1);
    const S1: StreamId = StreamId(2);
    const T: TokenId = TokenId(40);
    const EXT: TokenId = TokenId(41);

    fn sample() -> CaptureGraph {
        let mut g = CaptureGraph::new(GraphId(3));
        g.record(S0, NodeKind::DispatchCompute, None, &[], Some(T))
            .unwrap();
        g.record(S1, NodeKind::Barrier, None, &[T, EXT], None).unwrap();
        g.record(S0, NodeKind::CopyMemory, None, &[], None).unwrap();
        g
    }

    #[test]
    fn concise_has_clusters_and_edges() {
        let dot = dot_string(&sample(), DumpMode::Concise);
        assert!(dot.starts_with("digraph capture_3 {"));
        assert!(dot.contains("subgraph cluster_1 {"));
        assert!(dot.contains("subgraph cluster_2 {"));
        // Stream order on S0, token edge with generation label.
        assert!(dot.contains("n0 -> n2;"));
        assert!(dot.contains("n0 -> n1 [label=\"TokenId(40)#1\"];"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn external_waits_are_dashed() {
        let dot = dot_string(&sample(), DumpMode::Concise);
        assert!(dot.contains("x41 [label=\"TokenId(41)\", shape=ellipse, style=dashed];"));
        assert!(dot.contains("x41 -> n1 [style=dashed];"));
        // The in-graph token never becomes a placeholder.
        assert!(!dot.contains("x40 "));
    }

    #[test]
    fn detailed_labels_carry_bindings() {
        let dot = dot_string(&sample(), DumpMode::Detailed);
        assert!(dot.contains("dispatch #0"));
        assert!(dot.contains("signal TokenId(40)#1"));
        assert!(dot.contains("wait TokenId(41)#0"));
    }

    #[test]
    fn write_dot_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.dot");
        write_dot(&sample(), &path, DumpMode::Concise).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("digraph"));
    }
}
