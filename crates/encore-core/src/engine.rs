//! The capture/replay engine façade.
//!
//! [`CaptureEngine`] owns every handle table (streams, tokens, capture
//! graphs, compiled graphs), the recording registry, and the submission
//! backend. All public operations validate in a fixed order: the extension
//! slot first, then handle arguments, then state, so a malformed call fails
//! the same way regardless of engine state.
//!
//! Appends on a recording stream are recorded, never submitted. Appends on an
//! idle stream either submit immediately or, when a wait references a token
//! signaled inside an actively recorded graph, fork the stream into that
//! session first.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::capture::{CaptureGraph, GraphId};
use crate::compile;
use crate::compiled::{CompiledGraph, CompiledGraphId};
use crate::error::{Error, Result};
use crate::export::{self, DumpMode};
use crate::ext::Extension;
use crate::node::NodeKind;
use crate::registry::RecordingRegistry;
use crate::submit::{CommandPayload, StreamId, SubmissionBatch, SubmitBackend, SubmittedOp};
use crate::token::{SyncPoint, TokenId, TokenKind};

/// Host-side bookkeeping for one token.
struct TokenMeta {
    kind: TokenKind,
    /// Highest scoreboard value any submitted signal targets.
    submitted: u64,
}

/// Capture, compilation, and replay engine.
///
/// The engine is the context: every stream, token, and graph handle it issues
/// is scoped to it. It is fully thread-safe; internal locks are held only for
/// the duration of a single operation.
pub struct CaptureEngine {
    backend: Arc<dyn SubmitBackend>,
    registry: RecordingRegistry,
    next_stream: AtomicU64,
    next_token: AtomicU64,
    next_graph: AtomicU64,
    next_compiled: AtomicU64,
    streams: Mutex<HashSet<StreamId>>,
    tokens: Mutex<HashMap<TokenId, TokenMeta>>,
    /// Graphs sit behind their own locks: appends contend only on the graph
    /// they record into, not on the table.
    graphs: Mutex<HashMap<GraphId, Arc<Mutex<CaptureGraph>>>>,
    compiled: Mutex<HashMap<CompiledGraphId, Arc<CompiledGraph>>>,
}

impl CaptureEngine {
    /// Creates an engine on top of the given submission backend.
    pub fn new(backend: Arc<dyn SubmitBackend>) -> Self {
        Self {
            backend,
            registry: RecordingRegistry::new(),
            next_stream: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            next_graph: AtomicU64::new(1),
            next_compiled: AtomicU64::new(1),
            streams: Mutex::new(HashSet::new()),
            tokens: Mutex::new(HashMap::new()),
            graphs: Mutex::new(HashMap::new()),
            compiled: Mutex::new(HashMap::new()),
        }
    }

    // --- handle creation ---

    /// Creates a new command stream.
    pub fn create_stream(&self) -> StreamId {
        let id = StreamId(self.next_stream.fetch_add(1, Ordering::Relaxed));
        let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        streams.insert(id);
        tracing::debug!("create_stream: {id}");
        id
    }

    /// Creates a new synchronization token.
    pub fn create_token(&self, kind: TokenKind) -> TokenId {
        let id = TokenId(self.next_token.fetch_add(1, Ordering::Relaxed));
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.insert(
            id,
            TokenMeta {
                kind,
                submitted: 0,
            },
        );
        tracing::debug!("create_token: {id} ({kind:?})");
        id
    }

    /// Creates an empty capture graph to be used as a capture destination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedExtension`] for any non-empty `ext`.
    pub fn create_graph(&self, ext: Extension) -> Result<GraphId> {
        ext.require_none()?;
        let id = GraphId(self.next_graph.fetch_add(1, Ordering::Relaxed));
        let mut graphs = self.graphs.lock().unwrap_or_else(|e| e.into_inner());
        graphs.insert(id, Arc::new(Mutex::new(CaptureGraph::new(id))));
        tracing::debug!("create_graph: {id}");
        Ok(id)
    }

    /// Destroys a capture graph.
    ///
    /// Compiled instances produced from the graph are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGraph`] for a dead handle, or
    /// [`Error::InvalidArgument`] while a recording session still targets the
    /// graph.
    pub fn destroy_graph(&self, graph: GraphId) -> Result<()> {
        if self.registry.recording_graphs().contains(&graph) {
            return Err(Error::InvalidArgument(
                "graph has an active recording session",
            ));
        }
        let mut graphs = self.graphs.lock().unwrap_or_else(|e| e.into_inner());
        if graphs.remove(&graph).is_none() {
            return Err(Error::UnknownGraph(graph));
        }
        tracing::debug!("destroy_graph: {graph}");
        Ok(())
    }

    /// Destroys a compiled graph instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCompiledGraph`] for a dead handle.
    pub fn destroy_compiled(&self, compiled: CompiledGraphId) -> Result<()> {
        let mut table = self.compiled.lock().unwrap_or_else(|e| e.into_inner());
        if table.remove(&compiled).is_none() {
            return Err(Error::UnknownCompiledGraph(compiled));
        }
        tracing::debug!("destroy_compiled: {compiled}");
        Ok(())
    }

    // --- recording sessions ---

    /// Begins recording on `stream` into a fresh, engine-owned graph.
    ///
    /// The graph handle is returned by the matching [`end_capture`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedExtension`], [`Error::UnknownStream`], or
    /// [`Error::AlreadyRecording`]. On failure no session or graph exists.
    ///
    /// [`end_capture`]: CaptureEngine::end_capture
    pub fn begin_capture(&self, stream: StreamId, ext: Extension) -> Result<()> {
        ext.require_none()?;
        self.check_stream(stream)?;

        let id = GraphId(self.next_graph.fetch_add(1, Ordering::Relaxed));
        let mut graphs = self.graphs.lock().unwrap_or_else(|e| e.into_inner());
        let mut graph = CaptureGraph::new(id);
        graph.bind_origin(stream);
        self.registry.begin(stream, id, true)?;
        graphs.insert(id, Arc::new(Mutex::new(graph)));
        tracing::debug!("begin_capture: {stream} -> {id}");
        Ok(())
    }

    /// Begins recording on `stream` into an existing destination graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedExtension`], [`Error::UnknownStream`],
    /// [`Error::UnknownGraph`], [`Error::GraphSealed`], or
    /// [`Error::AlreadyRecording`]. On failure no session is opened.
    pub fn begin_capture_into(
        &self,
        stream: StreamId,
        graph: GraphId,
        ext: Extension,
    ) -> Result<()> {
        ext.require_none()?;
        self.check_stream(stream)?;

        let arc = self.graph(graph)?;
        let mut g = arc.lock().unwrap_or_else(|e| e.into_inner());
        if g.is_sealed() {
            return Err(Error::GraphSealed(graph));
        }
        self.registry.begin(stream, graph, true)?;
        g.bind_origin(stream);
        tracing::debug!("begin_capture_into: {stream} -> {graph}");
        Ok(())
    }

    /// Ends the recording session `stream` opened and seals its graph.
    ///
    /// Streams pulled into the session by a fork are released as well; their
    /// own end-capture would fail, since they never began one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedExtension`], [`Error::UnknownStream`], or
    /// [`Error::NotRecording`].
    pub fn end_capture(&self, stream: StreamId, ext: Extension) -> Result<GraphId> {
        ext.require_none()?;
        self.check_stream(stream)?;

        let graph = self.registry.end(stream)?;
        if let Ok(arc) = self.graph(graph) {
            arc.lock().unwrap_or_else(|e| e.into_inner()).seal();
        }
        self.registry.clear_graph(graph);
        tracing::debug!("end_capture: {stream} -> {graph}");
        Ok(graph)
    }

    // --- append surface ---

    /// Appends a compute dispatch.
    pub fn append_dispatch(
        &self,
        stream: StreamId,
        payload: Arc<dyn CommandPayload>,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<()> {
        self.append(stream, NodeKind::DispatchCompute, Some(payload), waits, signal)
    }

    /// Appends a memory copy.
    pub fn append_copy(
        &self,
        stream: StreamId,
        payload: Arc<dyn CommandPayload>,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<()> {
        self.append(stream, NodeKind::CopyMemory, Some(payload), waits, signal)
    }

    /// Appends a memory fill.
    pub fn append_fill(
        &self,
        stream: StreamId,
        payload: Arc<dyn CommandPayload>,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<()> {
        self.append(stream, NodeKind::FillMemory, Some(payload), waits, signal)
    }

    /// Appends an execution barrier.
    pub fn append_barrier(
        &self,
        stream: StreamId,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<()> {
        self.append(stream, NodeKind::Barrier, None, waits, signal)
    }

    /// Appends a pure signal of `token`.
    pub fn append_signal(&self, stream: StreamId, token: TokenId) -> Result<()> {
        self.append(stream, NodeKind::SignalToken, None, &[], Some(token))
    }

    /// Appends a pure wait on `tokens`.
    pub fn append_wait(&self, stream: StreamId, tokens: &[TokenId]) -> Result<()> {
        self.append(stream, NodeKind::WaitTokens, None, tokens, None)
    }

    /// Common append path: record, fork-and-record, or submit immediately.
    ///
    /// Should more than one actively recorded graph have signaled a waited
    /// token, the stream joins the oldest such graph (lowest graph ID).
    fn append(
        &self,
        stream: StreamId,
        kind: NodeKind,
        payload: Option<Arc<dyn CommandPayload>>,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<()> {
        self.check_stream(stream)?;
        self.check_tokens(waits, signal)?;

        if let Some(graph) = self.registry.active_graph(stream) {
            let arc = self.graph(graph)?;
            let mut g = arc.lock().unwrap_or_else(|e| e.into_inner());
            g.record(stream, kind, payload, waits, signal)?;
            return Ok(());
        }

        // Fork detection: a wait on a token signaled inside an actively
        // recorded graph pulls this stream into that session.
        if !waits.is_empty() {
            for graph in self.registry.recording_graphs() {
                let Ok(arc) = self.graph(graph) else { continue };
                let mut g = arc.lock().unwrap_or_else(|e| e.into_inner());
                if waits.iter().any(|&t| g.has_signaled(t)) {
                    self.registry.begin(stream, graph, false)?;
                    tracing::debug!("append_fork: {stream} joins {graph}");
                    g.record(stream, kind, payload, waits, signal)?;
                    return Ok(());
                }
            }
        }

        self.submit_immediate(stream, kind, payload, waits, signal)
    }

    /// Submits a single non-captured operation to the backend.
    fn submit_immediate(
        &self,
        stream: StreamId,
        kind: NodeKind,
        payload: Option<Arc<dyn CommandPayload>>,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<()> {
        let (wait_points, signal_points) = {
            let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
            let wait_points = resolve_waits(&tokens, waits);
            let signal_points: Vec<SyncPoint> = signal
                .map(|t| resolve_signal(&mut tokens, t))
                .into_iter()
                .collect();
            (wait_points, signal_points)
        };

        tracing::trace!(
            "submit_immediate: {} on {stream} ({} waits, {} signals)",
            kind.name(),
            wait_points.len(),
            signal_points.len(),
        );
        let batch = SubmissionBatch {
            ops: vec![SubmittedOp {
                stream,
                payload,
                waits: wait_points,
                signals: signal_points,
            }],
        };
        self.backend.submit(stream, batch)?;
        Ok(())
    }

    // --- compilation and replay ---

    /// Compiles a sealed capture graph into a replayable instance.
    ///
    /// Validation (cycle and dangling-generation checks) happens here, not at
    /// seal time. The instance is independent of the source graph and of
    /// every token handle used during capture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedExtension`], [`Error::UnknownGraph`],
    /// [`Error::SourceGraphNotSealed`], [`Error::CycleDetected`], or
    /// [`Error::DanglingWait`].
    pub fn instantiate(&self, graph: GraphId, ext: Extension) -> Result<CompiledGraphId> {
        ext.require_none()?;

        let arc = self.graph(graph)?;
        let g = arc.lock().unwrap_or_else(|e| e.into_inner());
        if !g.is_sealed() {
            return Err(Error::SourceGraphNotSealed(graph));
        }

        let id = CompiledGraphId(self.next_compiled.fetch_add(1, Ordering::Relaxed));
        let instance = compile::compile(&g, id, &self.next_token, &self.next_stream)?;
        drop(g);

        let mut table = self.compiled.lock().unwrap_or_else(|e| e.into_inner());
        table.insert(id, Arc::new(instance));
        Ok(id)
    }

    /// Replays a compiled instance onto `stream` as one atomic submission.
    ///
    /// `waits` gate the instance's external-wait nodes; `signal`, if present,
    /// is signaled once the whole replay has completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedExtension`], [`Error::UnknownStream`],
    /// [`Error::UnknownCompiledGraph`], [`Error::UnknownToken`],
    /// [`Error::AlreadyRecording`] if the target stream is mid-capture, or a
    /// backend [`Error::Submission`].
    pub fn append_compiled(
        &self,
        stream: StreamId,
        compiled: CompiledGraphId,
        ext: Extension,
        waits: &[TokenId],
        signal: Option<TokenId>,
    ) -> Result<()> {
        ext.require_none()?;
        self.check_stream(stream)?;
        self.check_tokens(waits, signal)?;
        if self.registry.is_recording(stream) {
            return Err(Error::AlreadyRecording(stream));
        }

        let instance = {
            let table = self.compiled.lock().unwrap_or_else(|e| e.into_inner());
            table
                .get(&compiled)
                .cloned()
                .ok_or(Error::UnknownCompiledGraph(compiled))?
        };

        let ordinal = instance.next_ordinal();
        let (wait_points, completion) = {
            let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
            let wait_points = resolve_waits(&tokens, waits);
            let completion = signal.map(|t| resolve_signal(&mut tokens, t));
            (wait_points, completion)
        };

        tracing::debug!("append_compiled: {compiled} replay {ordinal} on {stream}");
        let batch = instance.build_batch(stream, ordinal, &wait_points, completion);
        self.backend.submit(stream, batch)?;
        Ok(())
    }

    // --- introspection ---

    /// Reports whether a capture session is active on `stream`.
    ///
    /// Reserved: not available in this contract.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::UnsupportedFeature`].
    pub fn is_capture_active(&self, _stream: StreamId) -> Result<bool> {
        Err(Error::UnsupportedFeature("is_capture_active"))
    }

    /// Reports whether a capture graph holds no nodes.
    ///
    /// Reserved: not available in this contract.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::UnsupportedFeature`].
    pub fn graph_is_empty(&self, _graph: GraphId) -> Result<bool> {
        Err(Error::UnsupportedFeature("graph_is_empty"))
    }

    /// Writes a rendering of a capture graph to `path`.
    ///
    /// Reserved: not available in this contract. See [`debug_dot`] for the
    /// debug-only exporter backing the eventual implementation.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::UnsupportedFeature`].
    ///
    /// [`debug_dot`]: CaptureEngine::debug_dot
    pub fn dump_contents(
        &self,
        _graph: GraphId,
        _path: &std::path::Path,
        _mode: DumpMode,
    ) -> Result<()> {
        Err(Error::UnsupportedFeature("dump_contents"))
    }

    /// Renders a live capture graph as Graphviz DOT text.
    ///
    /// Debug aid only; the stable dump surface stays reserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGraph`] for a dead handle.
    pub fn debug_dot(&self, graph: GraphId, mode: DumpMode) -> Result<String> {
        let arc = self.graph(graph)?;
        let g = arc.lock().unwrap_or_else(|e| e.into_inner());
        Ok(export::dot_string(&g, mode))
    }

    // --- validation helpers ---

    fn graph(&self, graph: GraphId) -> Result<Arc<Mutex<CaptureGraph>>> {
        let graphs = self.graphs.lock().unwrap_or_else(|e| e.into_inner());
        graphs
            .get(&graph)
            .cloned()
            .ok_or(Error::UnknownGraph(graph))
    }

    fn check_stream(&self, stream: StreamId) -> Result<()> {
        let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
        if streams.contains(&stream) {
            Ok(())
        } else {
            Err(Error::UnknownStream(stream))
        }
    }

    fn check_tokens(&self, waits: &[TokenId], signal: Option<TokenId>) -> Result<()> {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        for &token in waits.iter().chain(signal.iter()) {
            if !tokens.contains_key(&token) {
                return Err(Error::UnknownToken(token));
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn with_graph<R>(&self, graph: GraphId, f: impl FnOnce(&CaptureGraph) -> R) -> Option<R> {
        let arc = self.graph(graph).ok()?;
        let g = arc.lock().unwrap_or_else(|e| e.into_inner());
        Some(f(&g))
    }
}

/// Resolves wait handles into scoreboard points.
///
/// A wait targets the token's highest submitted value, floored at 1 so a
/// wait on a never-signaled token blocks until a signal arrives.
fn resolve_waits(tokens: &HashMap<TokenId, TokenMeta>, waits: &[TokenId]) -> Vec<SyncPoint> {
    waits
        .iter()
        .map(|&token| SyncPoint {
            token,
            value: tokens.get(&token).map_or(1, |m| m.submitted.max(1)),
        })
        .collect()
}

/// Resolves a signal handle into a scoreboard point and advances the token's
/// submitted-value watermark.
fn resolve_signal(tokens: &mut HashMap<TokenId, TokenMeta>, token: TokenId) -> SyncPoint {
    let value = match tokens.get_mut(&token) {
        Some(meta) => {
            let value = match meta.kind {
                TokenKind::Fence => 1,
                TokenKind::Counter => meta.submitted + 1,
            };
            meta.submitted = meta.submitted.max(value);
            value
        }
        None => 1,
    };
    SyncPoint { token, value }
}
