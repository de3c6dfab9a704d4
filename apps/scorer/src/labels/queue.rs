//! Rate-limited label queue.
//!
//! Label calls go to an external service with tight throughput limits, so a run
//! pushes every operation through one `LabelQueue`: a FIFO of pending ops with a
//! per-run budget, at most one call in flight, and a pacing delay between
//! consecutive calls. The queue itself is a synchronous state machine; `drain`
//! is the only place that sleeps or awaits the publisher.
//!
//! Ops left in the queue once the budget is spent are deferred to the next run.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::labels::{LabelAction, LabelOp, LabelPublisher, LabelerError};

/// Decides how long to wait before the next call.
pub trait PacingPolicy: Send + Sync {
    /// `dispatched` is the number of calls already made this run (≥ 1).
    fn delay_after(&self, dispatched: usize) -> Duration;
}

/// Same pause between every pair of calls.
pub struct FixedDelay(pub Duration);

impl PacingPolicy for FixedDelay {
    fn delay_after(&self, _dispatched: usize) -> Duration {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ready,
    CoolingDown,
}

#[derive(Debug, PartialEq)]
pub enum QueueStep {
    Dispatch(LabelOp),
    Delay(Duration),
    /// Budget spent with ops still pending.
    Exhausted,
    Drained,
}

#[derive(Debug)]
pub struct LabelOutcome {
    pub op: LabelOp,
    pub result: Result<(), LabelerError>,
}

impl LabelOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct LabelQueue {
    pending: VecDeque<LabelOp>,
    budget: usize,
    dispatched: usize,
    phase: Phase,
    pacing: Arc<dyn PacingPolicy>,
}

impl LabelQueue {
    pub fn new(budget: usize, pacing: Arc<dyn PacingPolicy>) -> Self {
        Self {
            pending: VecDeque::new(),
            budget,
            dispatched: 0,
            phase: Phase::Ready,
            pacing,
        }
    }

    pub fn push(&mut self, op: LabelOp) {
        self.pending.push_back(op);
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Removes and returns everything still pending.
    pub fn take_deferred(&mut self) -> Vec<LabelOp> {
        self.pending.drain(..).collect()
    }

    /// Advances the state machine by one step.
    pub fn step(&mut self) -> QueueStep {
        if self.pending.is_empty() {
            return QueueStep::Drained;
        }
        if self.dispatched >= self.budget {
            return QueueStep::Exhausted;
        }
        if self.phase == Phase::CoolingDown {
            self.phase = Phase::Ready;
            let delay = self.pacing.delay_after(self.dispatched);
            if !delay.is_zero() {
                return QueueStep::Delay(delay);
            }
        }
        match self.pending.pop_front() {
            Some(op) => {
                self.dispatched += 1;
                self.phase = Phase::CoolingDown;
                QueueStep::Dispatch(op)
            }
            None => QueueStep::Drained,
        }
    }
}

/// Runs the queue until it drains or the budget is spent. Each call is bounded
/// by `call_timeout`; failures are logged and returned, never propagated.
pub async fn drain(
    queue: &mut LabelQueue,
    publisher: &dyn LabelPublisher,
    call_timeout: Duration,
) -> Vec<LabelOutcome> {
    let mut outcomes = Vec::new();
    loop {
        match queue.step() {
            QueueStep::Dispatch(op) => {
                let result = dispatch(&op, publisher, call_timeout).await;
                if let Err(e) = &result {
                    warn!(
                        note_id = %op.note_id,
                        origin = ?op.origin,
                        "Label operation failed: {e}"
                    );
                }
                outcomes.push(LabelOutcome { op, result });
            }
            QueueStep::Delay(delay) => tokio::time::sleep(delay).await,
            QueueStep::Exhausted => {
                debug!(
                    "Label budget spent with {} ops pending",
                    queue.pending.len()
                );
                break;
            }
            QueueStep::Drained => break,
        }
    }
    outcomes
}

async fn dispatch(
    op: &LabelOp,
    publisher: &dyn LabelPublisher,
    call_timeout: Duration,
) -> Result<(), LabelerError> {
    let call = async {
        match op.action {
            LabelAction::Publish(status) => {
                publisher.publish_label(op.note_id, &op.post_uri, status).await
            }
            LabelAction::Negate => publisher.negate_label(op.note_id, &op.post_uri).await,
        }
    };
    tokio::time::timeout(call_timeout, call)
        .await
        .map_err(|_| LabelerError::Timeout(call_timeout))?
}
