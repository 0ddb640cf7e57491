//! The software device.
//!
//! [`SoftDevice`] executes submission batches on the host: one FIFO queue per
//! stream, a shared token scoreboard, and a deterministic pump that runs the
//! first ready operation across streams (in stream-ID order) until nothing
//! can make progress. Operations whose waits are unsatisfied stay queued at
//! the front of their stream and block everything behind them, matching
//! in-order hardware queues.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use encore_core::{StreamId, SubmissionBatch, SubmitBackend, SubmitError, SubmittedOp, TokenId};

use crate::payload::{CopyOp, DispatchOp, FillOp};

/// Host-side device executing batches synchronously at submit time.
#[derive(Default)]
pub struct SoftDevice {
    queues: Mutex<BTreeMap<StreamId, VecDeque<SubmittedOp>>>,
    scoreboard: Mutex<HashMap<TokenId, u64>>,
    progress: Condvar,
}

impl SoftDevice {
    /// Creates an idle device with an empty scoreboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current scoreboard value of a token (0 if never signaled).
    pub fn token_value(&self, token: TokenId) -> u64 {
        let scoreboard = self.scoreboard.lock().unwrap_or_else(|e| e.into_inner());
        scoreboard.get(&token).copied().unwrap_or(0)
    }

    /// Signals a token from the host and pumps any newly unblocked work.
    pub fn signal_host(&self, token: TokenId, value: u64) {
        self.apply_signal(token, value);
        tracing::debug!("signal_host: {token} = {value}");
        self.pump();
    }

    /// Blocks until the token reaches `value`, up to `timeout`.
    ///
    /// Returns false on timeout.
    pub fn wait_token(&self, token: TokenId, value: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut scoreboard = self.scoreboard.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if scoreboard.get(&token).copied().unwrap_or(0) >= value {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timeout) = self
                .progress
                .wait_timeout(scoreboard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            scoreboard = guard;
        }
    }

    /// Returns the number of operations still blocked in stream queues.
    pub fn pending_ops(&self) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.values().map(VecDeque::len).sum()
    }

    /// Runs ready operations until no stream can make progress.
    fn pump(&self) {
        while let Some(op) = self.pop_ready() {
            self.execute(&op);
            for signal in &op.signals {
                self.apply_signal(signal.token, signal.value);
            }
        }
    }

    /// Pops the first queue-front operation whose waits are all satisfied,
    /// scanning streams in ID order.
    fn pop_ready(&self) -> Option<SubmittedOp> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let scoreboard = self.scoreboard.lock().unwrap_or_else(|e| e.into_inner());
        for queue in queues.values_mut() {
            let ready = queue.front().is_some_and(|op| {
                op.waits
                    .iter()
                    .all(|w| scoreboard.get(&w.token).copied().unwrap_or(0) >= w.value)
            });
            if ready {
                return queue.pop_front();
            }
        }
        None
    }

    fn apply_signal(&self, token: TokenId, value: u64) {
        let mut scoreboard = self.scoreboard.lock().unwrap_or_else(|e| e.into_inner());
        let state = scoreboard.entry(token).or_insert(0);
        *state = (*state).max(value);
        drop(scoreboard);
        self.progress.notify_all();
    }

    fn execute(&self, op: &SubmittedOp) {
        let Some(payload) = &op.payload else {
            return;
        };
        let any = payload.as_any();
        if let Some(copy) = any.downcast_ref::<CopyOp>() {
            copy.execute();
        } else if let Some(fill) = any.downcast_ref::<FillOp>() {
            fill.execute();
        } else if let Some(dispatch) = any.downcast_ref::<DispatchOp>() {
            tracing::trace!("dispatch: {} on {}", dispatch.name, op.stream);
            dispatch.execute();
        }
    }
}

impl SubmitBackend for SoftDevice {
    /// Enqueues the whole batch atomically, then pumps.
    ///
    /// Payload types are checked before anything is queued, so a rejected
    /// batch has no effect at all.
    fn submit(&self, target: StreamId, batch: SubmissionBatch) -> Result<(), SubmitError> {
        for op in &batch.ops {
            check_payload(op)?;
        }

        tracing::debug!("submit: {} ops targeting {target}", batch.len());
        {
            let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
            for op in batch.ops {
                queues.entry(op.stream).or_default().push_back(op);
            }
        }
        self.pump();
        Ok(())
    }
}

fn check_payload(op: &SubmittedOp) -> Result<(), SubmitError> {
    match &op.payload {
        None => Ok(()),
        Some(payload) => {
            let any = payload.as_any();
            if any.is::<CopyOp>() || any.is::<FillOp>() || any.is::<DispatchOp>() {
                Ok(())
            } else {
                Err(SubmitError::RejectedPayload("unknown payload type"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use encore_core::SyncPoint;

    use super::*;
    use crate::buffer::HostBuffer;

    const S0: StreamId = StreamId(1);
    const S1: StreamId = StreamId(2);
    const T: TokenId = TokenId(7);

    fn fill_op(dst: &HostBuffer, byte: u8) -> Option<Arc<dyn encore_core::CommandPayload>> {
        Some(Arc::new(FillOp {
            dst: dst.clone(),
            offset: 0,
            len: dst.len(),
            byte,
        }))
    }

    fn op(
        stream: StreamId,
        payload: Option<Arc<dyn encore_core::CommandPayload>>,
        waits: Vec<SyncPoint>,
        signals: Vec<SyncPoint>,
    ) -> SubmittedOp {
        SubmittedOp {
            stream,
            payload,
            waits,
            signals,
        }
    }

    // --- pump semantics ---

    #[test]
    fn unblocked_ops_run_at_submit() {
        let dev = SoftDevice::new();
        let buf = HostBuffer::zeroed(2);
        dev.submit(
            S0,
            SubmissionBatch {
                ops: vec![op(S0, fill_op(&buf, 5), vec![], vec![])],
            },
        )
        .unwrap();
        assert_eq!(buf.snapshot(), vec![5, 5]);
        assert_eq!(dev.pending_ops(), 0);
    }

    #[test]
    fn blocked_front_op_stalls_its_stream() {
        let dev = SoftDevice::new();
        let buf = HostBuffer::zeroed(1);
        let gate = SyncPoint { token: T, value: 1 };
        dev.submit(
            S0,
            SubmissionBatch {
                ops: vec![
                    op(S0, None, vec![gate], vec![]),
                    op(S0, fill_op(&buf, 9), vec![], vec![]),
                ],
            },
        )
        .unwrap();
        // Both ops wait: the gated one directly, the fill behind it.
        assert_eq!(dev.pending_ops(), 2);
        assert_eq!(buf.snapshot(), vec![0]);

        dev.signal_host(T, 1);
        assert_eq!(dev.pending_ops(), 0);
        assert_eq!(buf.snapshot(), vec![9]);
    }

    #[test]
    fn cross_stream_signal_unblocks_waiter() {
        let dev = SoftDevice::new();
        let buf = HostBuffer::zeroed(1);
        let point = SyncPoint { token: T, value: 1 };
        dev.submit(
            S0,
            SubmissionBatch {
                ops: vec![
                    op(S1, fill_op(&buf, 3), vec![point], vec![]),
                    op(S0, None, vec![], vec![point]),
                ],
            },
        )
        .unwrap();
        assert_eq!(buf.snapshot(), vec![3]);
        assert_eq!(dev.token_value(T), 1);
    }

    #[test]
    fn signals_are_monotonic() {
        let dev = SoftDevice::new();
        dev.signal_host(T, 5);
        dev.signal_host(T, 2);
        assert_eq!(dev.token_value(T), 5);
    }

    #[test]
    fn wait_token_times_out_when_unsignaled() {
        let dev = SoftDevice::new();
        assert!(!dev.wait_token(T, 1, Duration::from_millis(10)));
        dev.signal_host(T, 1);
        assert!(dev.wait_token(T, 1, Duration::from_millis(10)));
    }

    // --- payload validation ---

    #[test]
    fn unknown_payload_rejects_whole_batch() {
        #[derive(Debug)]
        struct Alien;
        impl encore_core::CommandPayload for Alien {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let dev = SoftDevice::new();
        let buf = HostBuffer::zeroed(1);
        let err = dev
            .submit(
                S0,
                SubmissionBatch {
                    ops: vec![
                        op(S0, fill_op(&buf, 1), vec![], vec![]),
                        op(S0, Some(Arc::new(Alien)), vec![], vec![]),
                    ],
                },
            )
            .unwrap_err();
        assert!(matches!(err, SubmitError::RejectedPayload(_)));
        // Nothing from the batch ran.
        assert_eq!(buf.snapshot(), vec![0]);
        assert_eq!(dev.pending_ops(), 0);
    }
}
