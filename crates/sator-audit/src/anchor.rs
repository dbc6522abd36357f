//! Best-effort external anchoring, decoupled from the append path.
//!
//! `AnchorOutbox` owns a worker thread fed through a channel. The ledger
//! enqueues an `AnchorRequest` and returns immediately; the worker runs each
//! anchor call on a helper thread and waits at most `timeout` for it.
//! Failures and timeouts are logged and dropped, so a slow or broken notary
//! never adds latency or risk to hashing and persistence.
//!
//! A timed-out helper keeps running until the anchor returns. At most
//! `MAX_IN_FLIGHT_CALLS` helpers exist at once; requests arriving while the
//! cap is reached are dropped with a warning instead of spawning more.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{self, RecvTimeoutError, Sender},
        Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use sator_contracts::audit::{AnchorReceipt, AnchorRequest};
use sator_core::traits::AuditAnchor;

/// Upper bound on concurrently running anchor calls, including ones whose
/// caller already gave up on them.
pub const MAX_IN_FLIGHT_CALLS: usize = 4;

/// Called on the worker thread for every receipt the anchor returns.
pub type ReceiptSink = Box<dyn Fn(&AnchorRequest, AnchorReceipt) + Send>;

/// Count of submitted-but-unfinished requests, for `flush`.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    fn add(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }

    fn done(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.drained.notify_all();
            }
        }
    }
}

/// Holds one in-flight slot until dropped.
struct CallSlot(Arc<AtomicUsize>);

impl CallSlot {
    fn acquire(in_flight: &Arc<AtomicUsize>) -> Option<Self> {
        in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < MAX_IN_FLIGHT_CALLS).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(in_flight)))
    }
}

impl Drop for CallSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AnchorOutbox {
    sender: Mutex<Option<Sender<AnchorRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Pending>,
    in_flight: Arc<AtomicUsize>,
}

impl AnchorOutbox {
    /// Start the worker thread.
    pub fn spawn(anchor: Arc<dyn AuditAnchor>, timeout: Duration, sink: ReceiptSink) -> Self {
        let (sender, receiver) = mpsc::channel::<AnchorRequest>();
        let pending = Arc::new(Pending::default());
        let worker_pending = Arc::clone(&pending);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let worker_in_flight = Arc::clone(&in_flight);

        let worker = thread::spawn(move || {
            for request in receiver {
                run_anchor_call(&anchor, &request, timeout, &sink, &worker_in_flight);
                worker_pending.done();
            }
            debug!("anchor outbox worker stopped");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            pending,
            in_flight,
        }
    }

    /// Anchor calls currently running, timed-out ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queue a request. Never blocks on the anchor itself.
    pub fn submit(&self, request: AnchorRequest) {
        let Ok(guard) = self.sender.lock() else {
            warn!(event_id = %request.event_id, "anchor outbox lock poisoned; request dropped");
            return;
        };
        let Some(sender) = guard.as_ref() else {
            warn!(event_id = %request.event_id, "anchor outbox closed; request dropped");
            return;
        };

        self.pending.add();
        if let Err(e) = sender.send(request) {
            self.pending.done();
            warn!(event_id = %e.0.event_id, "anchor outbox worker gone; request dropped");
        }
    }

    /// Wait until every queued request has finished or `max_wait` elapses.
    ///
    /// Returns `true` when the queue drained.
    pub fn flush(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        let Ok(mut count) = self.pending.count.lock() else {
            return false;
        };
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.pending.drained.wait_timeout(count, deadline - now) {
                Ok((guard, _)) => count = guard,
                Err(_) => return false,
            }
        }
        true
    }
}

impl Drop for AnchorOutbox {
    fn drop(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_anchor_call(
    anchor: &Arc<dyn AuditAnchor>,
    request: &AnchorRequest,
    timeout: Duration,
    sink: &ReceiptSink,
    in_flight: &Arc<AtomicUsize>,
) {
    let Some(slot) = CallSlot::acquire(in_flight) else {
        warn!(
            event_id = %request.event_id,
            max_in_flight = MAX_IN_FLIGHT_CALLS,
            "too many anchor calls still running; request dropped"
        );
        return;
    };

    let (done_tx, done_rx) = mpsc::channel();
    let call_anchor = Arc::clone(anchor);
    let call_request = request.clone();

    // The helper thread outlives a timed-out call; its result is discarded.
    thread::spawn(move || {
        let _slot = slot;
        let _ = done_tx.send(call_anchor.anchor_hash(&call_request));
    });

    match done_rx.recv_timeout(timeout) {
        Ok(Ok(receipt)) => {
            info!(
                event_id = %request.event_id,
                tx_signature = %receipt.tx_signature,
                "audit hash anchored"
            );
            sink(request, receipt);
        }
        Ok(Err(e)) => {
            warn!(event_id = %request.event_id, error = %e, "anchor call failed; continuing");
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                event_id = %request.event_id,
                timeout_ms = timeout.as_millis() as u64,
                "anchor call timed out; continuing"
            );
        }
        Err(RecvTimeoutError::Disconnected) => {
            warn!(event_id = %request.event_id, "anchor call aborted; continuing");
        }
    }
}
