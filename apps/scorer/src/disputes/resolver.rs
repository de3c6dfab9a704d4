//! Dispute Resolver — settles pending disputes against this run's fresh statuses.
//!
//! A dispute is decided by the consensus on the disputing note itself:
//! - CRH  → approved; the *target* note's label is negated.
//! - CRNH → rejected; the target's label is untouched.
//! - NMR or unscored → stays pending for a later run.
//!
//! Approved/rejected are terminal. Only pending disputes are ever loaded, and the
//! store refuses to move a dispute that is no longer pending.
//!
//! An approval is recorded even when the negate call fails; the failure is
//! counted and logged so the label can be reconciled by hand. Approvals whose
//! negation did not fit in the run's label budget stay pending instead.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::labels::ledger::{settle, LabelTally};
use crate::labels::queue::{drain, LabelQueue};
use crate::labels::{LabelAction, LabelOp, LabelOrigin, LabelPublisher};
use crate::models::dispute::{DisputeStatus, PendingDispute};
use crate::models::note::{LabelStatus, NoteStatus, NoteTarget};
use crate::store::ScoringStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeDecision {
    Approve,
    Reject,
    Wait,
}

/// Decision for a dispute given its disputing note's status this run.
pub fn decide(dispute_note_status: Option<NoteStatus>) -> DisputeDecision {
    match dispute_note_status {
        Some(NoteStatus::CurrentlyRatedHelpful) => DisputeDecision::Approve,
        Some(NoteStatus::CurrentlyRatedNotHelpful) => DisputeDecision::Reject,
        Some(NoteStatus::NeedsMoreRatings) | None => DisputeDecision::Wait,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisputeReport {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Status writes that failed; those disputes remain pending in storage.
    pub failed: usize,
}

impl DisputeReport {
    pub fn resolved(&self) -> usize {
        self.approved + self.rejected
    }
}

/// Everything the resolver reads; built by the orchestrator after scoring.
pub struct DisputeContext<'a> {
    pub store: &'a dyn ScoringStore,
    pub publisher: &'a dyn LabelPublisher,
    pub call_timeout: Duration,
    /// Statuses computed this run, keyed by note id.
    pub fresh_statuses: &'a HashMap<Uuid, NoteStatus>,
    /// Loaded before any label call this run, so `label_status` may be stale.
    pub targets: &'a HashMap<Uuid, NoteTarget>,
    /// Notes whose label an earlier step of this run negated successfully.
    pub negated_this_run: &'a HashSet<Uuid>,
}

pub async fn resolve_disputes(
    ctx: &DisputeContext<'_>,
    disputes: &[PendingDispute],
    queue: &mut LabelQueue,
    tally: &mut LabelTally,
) -> DisputeReport {
    let resolved_at = Utc::now();
    let mut report = DisputeReport::default();
    // target note → disputes approved against it this run
    let mut awaiting_negation: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();

    for dispute in disputes {
        let status = ctx.fresh_statuses.get(&dispute.dispute_note_id).copied();
        match decide(status) {
            DisputeDecision::Wait => report.pending += 1,
            DisputeDecision::Reject => {
                let status = DisputeStatus::Rejected;
                finalize(ctx.store, dispute.id, status, resolved_at, &mut report).await;
            }
            DisputeDecision::Approve => match ctx.targets.get(&dispute.target_note_id) {
                Some(target)
                    if target.label_status != LabelStatus::Negated
                        && !ctx.negated_this_run.contains(&target.note_id) =>
                {
                    awaiting_negation
                        .entry(target.note_id)
                        .or_default()
                        .push(dispute.id);
                }
                Some(_) => {
                    info!(
                        dispute_id = %dispute.id,
                        "Target label already negated; approving without a label call"
                    );
                    let status = DisputeStatus::Approved;
                    finalize(ctx.store, dispute.id, status, resolved_at, &mut report).await;
                }
                None => {
                    warn!(
                        dispute_id = %dispute.id,
                        target_note_id = %dispute.target_note_id,
                        "Disputed note no longer exists; approving"
                    );
                    let status = DisputeStatus::Approved;
                    finalize(ctx.store, dispute.id, status, resolved_at, &mut report).await;
                }
            },
        }
    }

    for (target_id, dispute_ids) in &awaiting_negation {
        // Keyed by targets we just looked up, so the entry exists.
        if let Some(target) = ctx.targets.get(target_id) {
            queue.push(LabelOp {
                note_id: *target_id,
                post_uri: target.post_uri.clone(),
                action: LabelAction::Negate,
                origin: LabelOrigin::Dispute(dispute_ids[0]),
            });
        }
    }

    let outcomes = drain(queue, ctx.publisher, ctx.call_timeout).await;
    settle(ctx.store, &outcomes, tally).await;

    for outcome in &outcomes {
        let Some(dispute_ids) = awaiting_negation.remove(&outcome.op.note_id) else {
            continue;
        };
        if let Err(e) = &outcome.result {
            warn!(
                target_note_id = %outcome.op.note_id,
                "Approving {} dispute(s) although the negate call failed: {e}",
                dispute_ids.len()
            );
        }
        for dispute_id in dispute_ids {
            let status = DisputeStatus::Approved;
            finalize(ctx.store, dispute_id, status, resolved_at, &mut report).await;
        }
    }

    let deferred = queue.take_deferred();
    tally.deferred += deferred.len();
    for op in deferred {
        if let Some(dispute_ids) = awaiting_negation.remove(&op.note_id) {
            debug!(target_note_id = %op.note_id, "Label budget spent; dispute approval deferred");
            report.pending += dispute_ids.len();
        }
    }

    report
}

async fn finalize(
    store: &dyn ScoringStore,
    dispute_id: Uuid,
    status: DisputeStatus,
    resolved_at: DateTime<Utc>,
    report: &mut DisputeReport,
) {
    match store.update_dispute_status(dispute_id, status, resolved_at).await {
        Ok(true) => {
            info!(%dispute_id, "Dispute {}", status.as_str());
            match status {
                DisputeStatus::Approved => report.approved += 1,
                DisputeStatus::Rejected => report.rejected += 1,
                DisputeStatus::Pending => {}
            }
        }
        Ok(false) => debug!(%dispute_id, "Dispute already resolved elsewhere"),
        Err(e) => {
            warn!(%dispute_id, "Failed to mark dispute {}: {e}", status.as_str());
            report.failed += 1;
        }
    }
}
