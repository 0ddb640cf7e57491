//! Recording-session registry.
//!
//! The registry tracks, per command stream, at most one active recording
//! session. It is an explicit, injectable object rather than process-global
//! state: the engine owns one, and exclusivity is enforced by check-and-set
//! on the session map entry. The map lock is held only for the duration of a
//! single check-and-set, never across recording work, so sessions on
//! different streams do not contend.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::capture::GraphId;
use crate::error::{Error, Result};
use crate::submit::StreamId;

/// One active stream → graph binding.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Session {
    /// Graph the stream records into.
    pub graph: GraphId,
    /// True if the stream opened the session itself via begin-capture;
    /// false if it was pulled in by a fork.
    pub explicit: bool,
}

/// Tracks active recording sessions with per-stream exclusivity.
#[derive(Default)]
pub struct RecordingRegistry {
    sessions: Mutex<HashMap<StreamId, Session>>,
}

impl RecordingRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session binding `stream` to `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRecording`] if the stream already has a
    /// session (explicit or implicit). On failure the registry is unchanged.
    pub(crate) fn begin(&self, stream: StreamId, graph: GraphId, explicit: bool) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&stream) {
            return Err(Error::AlreadyRecording(stream));
        }
        sessions.insert(stream, Session { graph, explicit });
        tracing::debug!(
            "registry_begin: {stream} -> {graph} ({})",
            if explicit { "explicit" } else { "fork" }
        );
        Ok(())
    }

    /// Closes the explicit session on `stream` and returns its graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRecording`] if the stream has no session of its
    /// own. Implicitly joined streams cannot end a session they never began;
    /// their bindings are cleared when the graph seals. On failure the
    /// registry is unchanged.
    pub(crate) fn end(&self, stream: StreamId) -> Result<GraphId> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get(&stream) {
            Some(session) if session.explicit => {
                let graph = session.graph;
                sessions.remove(&stream);
                tracing::debug!("registry_end: {stream} -> {graph}");
                Ok(graph)
            }
            _ => Err(Error::NotRecording(stream)),
        }
    }

    /// Returns the graph bound to `stream`, if a session is active.
    pub(crate) fn active_graph(&self, stream: StreamId) -> Option<GraphId> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(&stream).map(|s| s.graph)
    }

    /// Returns true if `stream` has any active session.
    pub fn is_recording(&self, stream: StreamId) -> bool {
        self.active_graph(stream).is_some()
    }

    /// Returns the graphs of all currently active sessions, deduplicated.
    pub(crate) fn recording_graphs(&self) -> Vec<GraphId> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut graphs: Vec<GraphId> = sessions.values().map(|s| s.graph).collect();
        graphs.sort_by_key(|g| g.0);
        graphs.dedup();
        graphs
    }

    /// Removes every session bound to `graph` (used when the graph seals).
    pub(crate) fn clear_graph(&self, graph: GraphId) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, s| s.graph != graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S0: StreamId = StreamId(1);
    const S1: StreamId = StreamId(2);
    const G0: GraphId = GraphId(10);
    const G1: GraphId = GraphId(11);

    // --- exclusivity ---

    #[test]
    fn second_begin_on_same_stream_fails() {
        let reg = RecordingRegistry::new();
        reg.begin(S0, G0, true).unwrap();
        let err = reg.begin(S0, G1, true).unwrap_err();
        assert!(matches!(err, Error::AlreadyRecording(s) if s == S0));
        // The original session survives the rejected begin.
        assert_eq!(reg.active_graph(S0), Some(G0));
        assert_eq!(reg.end(S0).unwrap(), G0);
    }

    #[test]
    fn different_streams_record_concurrently() {
        let reg = RecordingRegistry::new();
        reg.begin(S0, G0, true).unwrap();
        reg.begin(S1, G1, true).unwrap();
        assert_eq!(reg.active_graph(S0), Some(G0));
        assert_eq!(reg.active_graph(S1), Some(G1));
    }

    // --- end semantics ---

    #[test]
    fn end_without_begin_fails() {
        let reg = RecordingRegistry::new();
        let err = reg.end(S0).unwrap_err();
        assert!(matches!(err, Error::NotRecording(s) if s == S0));
    }

    #[test]
    fn end_clears_only_the_target_stream() {
        let reg = RecordingRegistry::new();
        reg.begin(S0, G0, true).unwrap();
        reg.begin(S1, G1, true).unwrap();
        reg.end(S0).unwrap();
        assert!(!reg.is_recording(S0));
        assert!(reg.is_recording(S1));
    }

    #[test]
    fn implicit_session_cannot_be_ended_explicitly() {
        let reg = RecordingRegistry::new();
        reg.begin(S0, G0, false).unwrap();
        let err = reg.end(S0).unwrap_err();
        assert!(matches!(err, Error::NotRecording(_)));
        // Still recording: the failed end had no side effects.
        assert!(reg.is_recording(S0));
    }

    // --- graph-wide teardown ---

    #[test]
    fn clear_graph_removes_fork_siblings() {
        let reg = RecordingRegistry::new();
        reg.begin(S0, G0, true).unwrap();
        reg.begin(S1, G0, false).unwrap();
        reg.clear_graph(G0);
        assert!(!reg.is_recording(S0));
        assert!(!reg.is_recording(S1));
    }

    #[test]
    fn recording_graphs_deduplicates() {
        let reg = RecordingRegistry::new();
        reg.begin(S0, G0, true).unwrap();
        reg.begin(S1, G0, false).unwrap();
        assert_eq!(reg.recording_graphs(), vec![G0]);
    }
}
