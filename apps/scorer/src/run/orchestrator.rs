//! Run Orchestrator — one batch pass of the scoring engine.
//!
//! Phases, in order: loading ratings → scoring → persisting scores →
//! publishing labels → resolving disputes → reporting.
//!
//! Nothing is retried within a run. Bulk reads and the score write are fatal;
//! label calls and dispute writes fail per item and the run carries on. Score
//! rows are written before any label call, so a label that fails or is deferred
//! only lags behind a status that is already correct in storage; the next run
//! sees the lagging `label_status` mirror and issues the call again.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::disputes::resolver::{decide, resolve_disputes, DisputeContext, DisputeDecision};
use crate::labels::ledger::{settle, LabelTally};
use crate::labels::queue::{drain, FixedDelay, LabelQueue, PacingPolicy};
use crate::labels::{LabelAction, LabelOp, LabelOrigin, LabelPublisher};
use crate::models::note::{NoteStatus, TargetType};
use crate::scoring::classifier::score_notes;
use crate::scoring::matrix_factorization::fit;
use crate::scoring::transitions::detect_transitions;
use crate::scoring::ScoringConfig;
use crate::store::ScoringStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    LoadingRatings,
    Scoring,
    PersistingScores,
    PublishingLabels,
    ResolvingDisputes,
    Reporting,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::LoadingRatings => "loading ratings",
            RunPhase::Scoring => "scoring",
            RunPhase::PersistingScores => "persisting scores",
            RunPhase::PublishingLabels => "publishing labels",
            RunPhase::ResolvingDisputes => "resolving disputes",
            RunPhase::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{phase} failed: {source}")]
    Store {
        phase: RunPhase,
        #[source]
        source: sqlx::Error,
    },

    #[error("Another scoring run holds the lease")]
    InProgress,

    #[error("Run lease error: {0}")]
    Lease(#[from] redis::RedisError),
}

impl RunError {
    fn store(phase: RunPhase) -> impl FnOnce(sqlx::Error) -> RunError {
        move |source| RunError::Store { phase, source }
    }
}

/// Pacing and cap for the label loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRunConfig {
    pub max_ops_per_run: usize,
    pub delay: Duration,
    pub call_timeout: Duration,
}

impl Default for LabelRunConfig {
    fn default() -> Self {
        Self {
            max_ops_per_run: 50,
            delay: Duration::from_millis(500),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl LabelRunConfig {
    pub fn pacing(&self) -> Arc<dyn PacingPolicy> {
        Arc::new(FixedDelay(self.delay))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub notes_scored: usize,
    pub ratings_processed: usize,
    pub ratings_skipped: usize,
    pub iterations: u32,
    pub converged: bool,
    pub transitions: usize,
    pub labels_published: usize,
    pub labels_negated: usize,
    pub labels_failed: usize,
    pub labels_deferred: usize,
    pub disputes_pending: usize,
    pub disputes_approved: usize,
    pub disputes_rejected: usize,
    pub disputes_resolved: usize,
    pub disputes_failed: usize,
    pub duration_ms: u64,
}

pub struct RunContext<'a> {
    pub store: &'a dyn ScoringStore,
    pub publisher: &'a dyn LabelPublisher,
    pub scoring: &'a ScoringConfig,
    pub labels: &'a LabelRunConfig,
}

fn enter(phase: RunPhase) {
    debug!(%phase, "Run phase");
}

/// Executes one complete run and returns its summary.
pub async fn execute_run(ctx: &RunContext<'_>) -> Result<RunSummary, RunError> {
    let started = Instant::now();
    let mut summary = RunSummary {
        converged: true,
        ..RunSummary::default()
    };

    // ── loading ratings ─────────────────────────────────────────────────────
    enter(RunPhase::LoadingRatings);
    let (ratings, disputes) = tokio::try_join!(
        ctx.store.load_ratings(),
        ctx.store.load_pending_disputes()
    )
    .map_err(RunError::store(RunPhase::LoadingRatings))?;
    info!(
        "Loaded {} ratings and {} pending disputes",
        ratings.len(),
        disputes.len()
    );

    summary.disputes_pending = disputes.len();
    if ratings.is_empty() {
        info!("No ratings to score; run complete");
        summary.duration_ms = elapsed_ms(started);
        return Ok(summary);
    }

    // ── scoring ─────────────────────────────────────────────────────────────
    enter(RunPhase::Scoring);
    let fit = fit(&ratings, ctx.scoring);
    if fit.converged {
        info!(
            "Fit {} notes across {} raters in {} iterations (loss {:.6}, global bias {:.4})",
            fit.notes.len(),
            fit.raters.len(),
            fit.iterations,
            fit.loss,
            fit.global_bias
        );
    } else {
        warn!(
            "Fit stopped at the {}-iteration ceiling without converging (loss {:.6})",
            fit.iterations, fit.loss
        );
    }
    if fit.ratings_skipped > 0 {
        warn!("Skipped {} self-ratings", fit.ratings_skipped);
    }
    let scores = score_notes(&fit, ctx.scoring);

    summary.notes_scored = scores.len();
    summary.ratings_processed = fit.ratings_used;
    summary.ratings_skipped = fit.ratings_skipped;
    summary.iterations = fit.iterations;
    summary.converged = fit.converged;

    // ── persisting scores ───────────────────────────────────────────────────
    // Every read happens before the upsert: previous statuses so the write is
    // not mistaken for history, and note targets so a failed read leaves
    // storage untouched.
    enter(RunPhase::PersistingScores);
    let fresh: HashMap<Uuid, NoteStatus> = scores.iter().map(|s| (s.note_id, s.status)).collect();
    let approving: HashSet<Uuid> = disputes
        .iter()
        .filter(|d| decide(fresh.get(&d.dispute_note_id).copied()) == DisputeDecision::Approve)
        .map(|d| d.target_note_id)
        .collect();
    let note_ids: Vec<Uuid> = scores.iter().map(|s| s.note_id).collect();
    let target_ids: Vec<Uuid> = note_ids
        .iter()
        .copied()
        .chain(approving.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let (previous, mut targets) = tokio::try_join!(
        ctx.store.load_previous_statuses(&note_ids),
        ctx.store.load_note_targets(&target_ids)
    )
    .map_err(RunError::store(RunPhase::PersistingScores))?;

    ctx.store
        .upsert_scores(&scores)
        .await
        .map_err(RunError::store(RunPhase::PersistingScores))?;
    info!("Persisted {} note scores", scores.len());

    // The resolver negates these targets shortly; a catch-up publish would be wasted.
    for id in &approving {
        if let Some(target) = targets.get_mut(id) {
            target.dispute_approved = true;
        }
    }
    let transitions = detect_transitions(&scores, &previous, &targets);
    summary.transitions = transitions.len();
    let catch_ups = transitions.iter().filter(|t| t.is_catch_up()).count();
    if catch_ups > 0 {
        info!("{catch_ups} notes have labels lagging their stored status");
    }

    // ── publishing labels ───────────────────────────────────────────────────
    enter(RunPhase::PublishingLabels);
    let mut queue = LabelQueue::new(ctx.labels.max_ops_per_run, ctx.labels.pacing());
    for transition in &transitions {
        match targets.get(&transition.note_id) {
            Some(target) if target.target_type == TargetType::Note => {
                debug!(note_id = %transition.note_id, "Counter-note transition; no label");
            }
            Some(target) => queue.push(LabelOp {
                note_id: transition.note_id,
                post_uri: target.post_uri.clone(),
                action: transition.action(),
                origin: LabelOrigin::Transition,
            }),
            None => {
                warn!(
                    note_id = %transition.note_id,
                    "Scored note no longer exists; skipping label"
                );
            }
        }
    }

    let outcomes = drain(&mut queue, ctx.publisher, ctx.labels.call_timeout).await;
    let mut tally = LabelTally::default();
    settle(ctx.store, &outcomes, &mut tally).await;
    let negated_this_run: HashSet<Uuid> = outcomes
        .iter()
        .filter(|o| o.succeeded() && o.op.action == LabelAction::Negate)
        .map(|o| o.op.note_id)
        .collect();
    let deferred = queue.take_deferred();
    if !deferred.is_empty() {
        info!(
            "Label budget spent after {} calls; {} label operations deferred to the next run",
            queue.dispatched(),
            deferred.len()
        );
    }
    tally.deferred += deferred.len();

    // ── resolving disputes ──────────────────────────────────────────────────
    enter(RunPhase::ResolvingDisputes);
    let dispute_ctx = DisputeContext {
        store: ctx.store,
        publisher: ctx.publisher,
        call_timeout: ctx.labels.call_timeout,
        fresh_statuses: &fresh,
        targets: &targets,
        negated_this_run: &negated_this_run,
    };
    let report = resolve_disputes(&dispute_ctx, &disputes, &mut queue, &mut tally).await;

    // ── reporting ───────────────────────────────────────────────────────────
    enter(RunPhase::Reporting);
    summary.labels_published = tally.published;
    summary.labels_negated = tally.negated;
    summary.labels_failed = tally.failed;
    summary.labels_deferred = tally.deferred;
    summary.disputes_pending = report.pending;
    summary.disputes_approved = report.approved;
    summary.disputes_rejected = report.rejected;
    summary.disputes_resolved = report.resolved();
    summary.disputes_failed = report.failed;
    summary.duration_ms = elapsed_ms(started);

    info!(
        notes_scored = summary.notes_scored,
        transitions = summary.transitions,
        labels_published = summary.labels_published,
        labels_negated = summary.labels_negated,
        labels_failed = summary.labels_failed,
        labels_deferred = summary.labels_deferred,
        disputes_resolved = summary.disputes_resolved,
        duration_ms = summary.duration_ms,
        "Scoring run complete"
    );

    Ok(summary)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dispute::{DisputeStatus, PendingDispute};
    use crate::models::note::{LabelStatus, NoteTarget};
    use crate::models::rating::{Helpfulness, Rating};
    use crate::models::score::NoteScore;
    use crate::testing::{MemoryStore, RecordingPublisher};
    use chrono::Utc;

    use Helpfulness::{Helpful, NotHelpful, SomewhatHelpful};

    struct Harness {
        store: MemoryStore,
        publisher: RecordingPublisher,
        scoring: ScoringConfig,
        labels: LabelRunConfig,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MemoryStore::default(),
                publisher: RecordingPublisher::default(),
                scoring: ScoringConfig {
                    helpful_threshold: 0.4,
                    min_ratings_for_helpful: 5,
                    ..ScoringConfig::default()
                },
                labels: LabelRunConfig {
                    max_ops_per_run: 50,
                    delay: Duration::from_millis(500),
                    call_timeout: Duration::from_secs(5),
                },
            }
        }

        fn note(&self, target_type: TargetType) -> Uuid {
            let id = Uuid::new_v4();
            self.store.add_note(NoteTarget {
                note_id: id,
                post_uri: format!("at://did:plc:poster/app.bsky.feed.post/{id}"),
                target_type,
                label_status: LabelStatus::None,
                dispute_approved: false,
            });
            id
        }

        /// Rates `note_id` once per value, each from a distinct rater.
        fn rate(&self, note_id: Uuid, values: &[Helpfulness]) {
            for value in values {
                self.store.add_rating(Rating {
                    note_id,
                    rater_did: format!("did:plc:{}", Uuid::new_v4()),
                    helpfulness: *value,
                    note_author_did: Some("did:plc:author".to_string()),
                    updated_at: Utc::now(),
                });
            }
        }

        /// Stores `status` from an earlier run, with the label that run applied.
        fn previous(&self, note_id: Uuid, status: NoteStatus) {
            self.store.set_score(NoteScore {
                note_id,
                intercept: 0.0,
                factor: 0.0,
                rating_count: 0,
                status,
            });
            let action = match status {
                NoteStatus::CurrentlyRatedNotHelpful => LabelAction::Negate,
                other => LabelAction::Publish(other),
            };
            self.store.set_label_status(note_id, action.resulting_status());
        }

        async fn run(&self) -> Result<RunSummary, RunError> {
            let ctx = RunContext {
                store: &self.store,
                publisher: &self.publisher,
                scoring: &self.scoring,
                labels: &self.labels,
            };
            execute_run(&ctx).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mostly_helpful_note_publishes_strong_label() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[Helpful, Helpful, Helpful, SomewhatHelpful, NotHelpful]);
        h.previous(note, NoteStatus::NeedsMoreRatings);

        let summary = h.run().await.unwrap();

        assert_eq!(summary.notes_scored, 1);
        assert_eq!(summary.ratings_processed, 5);
        assert_eq!(summary.labels_published, 1);
        let calls = h.publisher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].action,
            LabelAction::Publish(NoteStatus::CurrentlyRatedHelpful)
        );
        assert_eq!(
            h.store.score(note).unwrap().status,
            NoteStatus::CurrentlyRatedHelpful
        );
        assert_eq!(h.store.label_status(note), Some(LabelStatus::Published));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_on_same_ratings_makes_no_calls() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[Helpful, Helpful, SomewhatHelpful]);

        let first = h.run().await.unwrap();
        assert_eq!(first.labels_published, 1);
        let first_score = h.store.score(note).unwrap();

        let second = h.run().await.unwrap();
        assert_eq!(second.transitions, 0);
        assert_eq!(h.publisher.calls().len(), 1);
        assert_eq!(h.store.score(note).unwrap(), first_score);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crnh_negates_and_never_publishes() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[NotHelpful; 6]);
        h.previous(note, NoteStatus::CurrentlyRatedHelpful);

        let summary = h.run().await.unwrap();

        assert_eq!(summary.labels_negated, 1);
        assert_eq!(summary.labels_published, 0);
        let calls = h.publisher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].action, LabelAction::Negate);
        assert_eq!(h.store.label_status(note), Some(LabelStatus::Negated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_cap_defers_excess_with_scores_written() {
        let mut h = Harness::new();
        h.labels.max_ops_per_run = 3;
        let notes: Vec<Uuid> = (0..5).map(|_| h.note(TargetType::Post)).collect();
        for note in &notes {
            h.rate(*note, &[Helpful, SomewhatHelpful]);
        }

        let summary = h.run().await.unwrap();

        assert_eq!(summary.transitions, 5);
        assert_eq!(summary.labels_published, 3);
        assert_eq!(summary.labels_deferred, 2);
        assert_eq!(h.store.score_count(), 5);

        let calls = h.publisher.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_label_failure_is_isolated_to_its_note() {
        let h = Harness::new();
        let failing = h.note(TargetType::Post);
        let healthy = h.note(TargetType::Post);
        h.rate(failing, &[Helpful]);
        h.rate(healthy, &[Helpful]);
        h.publisher.fail_for(failing);

        let summary = h.run().await.unwrap();

        assert_eq!(summary.labels_failed, 1);
        assert_eq!(summary.labels_published, 1);
        assert_eq!(h.publisher.calls().len(), 2);
        assert!(h.store.score(failing).is_some());
        assert_eq!(h.store.label_status(failing), Some(LabelStatus::None));
        assert_eq!(h.store.label_status(healthy), Some(LabelStatus::Proposed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ratings_short_circuits() {
        let h = Harness::new();
        h.note(TargetType::Post);

        let summary = h.run().await.unwrap();

        assert_eq!(summary.notes_scored, 0);
        assert_eq!(summary.labels_published + summary.labels_negated, 0);
        assert_eq!(summary.disputes_resolved, 0);
        assert!(h.publisher.calls().is_empty());
        assert!(!h.store.log().contains(&"upsert_scores"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rating_load_failure_aborts_without_writes() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[Helpful]);
        h.store.fail_rating_loads();

        let err = h.run().await.unwrap_err();

        assert!(matches!(
            err,
            RunError::Store {
                phase: RunPhase::LoadingRatings,
                ..
            }
        ));
        assert_eq!(h.store.score_count(), 0);
        assert!(h.publisher.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_write_failure_aborts_before_labels() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[Helpful]);
        h.store.fail_score_upserts();

        let err = h.run().await.unwrap_err();

        assert!(matches!(
            err,
            RunError::Store {
                phase: RunPhase::PersistingScores,
                ..
            }
        ));
        assert!(h.publisher.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_statuses_read_before_write() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[Helpful]);

        h.run().await.unwrap();

        let log = h.store.log();
        let read = log.iter().position(|op| *op == "load_previous_statuses").unwrap();
        let write = log.iter().position(|op| *op == "upsert_scores").unwrap();
        assert!(read < write);
    }

    #[tokio::test(start_paused = true)]
    async fn test_approved_dispute_negates_target_post() {
        let h = Harness::new();
        let target = h.note(TargetType::Post);
        let counter = h.note(TargetType::Note);
        h.rate(target, &[Helpful, Helpful, Helpful, Helpful, Helpful]);
        h.previous(target, NoteStatus::CurrentlyRatedHelpful);
        h.rate(counter, &[Helpful, Helpful, Helpful, Helpful, Helpful]);
        let dispute = PendingDispute {
            id: Uuid::new_v4(),
            dispute_note_id: counter,
            target_note_id: target,
        };
        h.store.add_dispute(dispute.clone());

        let summary = h.run().await.unwrap();

        assert_eq!(summary.disputes_approved, 1);
        assert_eq!(summary.disputes_resolved, 1);
        let calls = h.publisher.calls();
        let negations: Vec<_> = calls
            .iter()
            .filter(|c| c.action == LabelAction::Negate)
            .collect();
        assert_eq!(negations.len(), 1);
        assert_eq!(negations[0].note_id, target);
        // The counter-note's own transition never labels the post.
        assert!(calls.iter().all(|c| c.note_id != counter));
        assert_eq!(h.store.dispute_status(dispute.id), DisputeStatus::Approved);
        assert!(h.store.dispute_resolved_at(dispute.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_dispute_is_never_revisited() {
        let h = Harness::new();
        let target = h.note(TargetType::Post);
        let counter = h.note(TargetType::Note);
        h.rate(counter, &[NotHelpful; 5]);
        let dispute = PendingDispute {
            id: Uuid::new_v4(),
            dispute_note_id: counter,
            target_note_id: target,
        };
        h.store.add_dispute(dispute.clone());

        let first = h.run().await.unwrap();
        assert_eq!(first.disputes_rejected, 1);
        let resolved_at = h.store.dispute_resolved_at(dispute.id);

        // The counter-note later wins consensus; the rejection stands.
        h.rate(counter, &[Helpful; 30]);
        let second = h.run().await.unwrap();

        assert_eq!(second.disputes_resolved, 0);
        assert_eq!(h.store.dispute_status(dispute.id), DisputeStatus::Rejected);
        assert_eq!(h.store.dispute_resolved_at(dispute.id), resolved_at);
        assert!(h.publisher.calls().iter().all(|c| c.note_id != target));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispute_negations_share_the_run_budget() {
        let mut h = Harness::new();
        h.labels.max_ops_per_run = 1;
        let target = h.note(TargetType::Post);
        let counter = h.note(TargetType::Note);
        h.rate(target, &[SomewhatHelpful]);
        h.previous(target, NoteStatus::NeedsMoreRatings);
        let other = h.note(TargetType::Post);
        h.rate(other, &[Helpful]);
        h.rate(counter, &[Helpful; 5]);
        let dispute = PendingDispute {
            id: Uuid::new_v4(),
            dispute_note_id: counter,
            target_note_id: target,
        };
        h.store.add_dispute(dispute.clone());

        let summary = h.run().await.unwrap();

        assert_eq!(h.publisher.calls().len(), 1);
        assert_eq!(summary.labels_deferred, 1);
        assert_eq!(summary.disputes_pending, 1);
        assert_eq!(h.store.dispute_status(dispute.id), DisputeStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_label_is_published_next_run() {
        let mut h = Harness::new();
        h.labels.max_ops_per_run = 1;
        let first = h.note(TargetType::Post);
        let second = h.note(TargetType::Post);
        h.rate(first, &[Helpful]);
        h.rate(second, &[Helpful]);

        let run1 = h.run().await.unwrap();
        assert_eq!(run1.labels_published, 1);
        assert_eq!(run1.labels_deferred, 1);

        let run2 = h.run().await.unwrap();
        assert_eq!(run2.transitions, 1);
        assert_eq!(run2.labels_published, 1);
        assert_eq!(h.publisher.calls().len(), 2);
        assert_eq!(h.store.label_status(first), Some(LabelStatus::Proposed));
        assert_eq!(h.store.label_status(second), Some(LabelStatus::Proposed));

        let run3 = h.run().await.unwrap();
        assert_eq!(run3.transitions, 0);
        assert_eq!(h.publisher.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_label_is_retried_next_run() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[Helpful]);
        h.publisher.fail_for(note);

        let run1 = h.run().await.unwrap();
        assert_eq!(run1.labels_failed, 1);

        h.publisher.recover(note);
        let run2 = h.run().await.unwrap();
        assert_eq!(run2.labels_published, 1);
        assert_eq!(h.store.label_status(note), Some(LabelStatus::Proposed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_load_failure_writes_no_scores() {
        let h = Harness::new();
        let note = h.note(TargetType::Post);
        h.rate(note, &[Helpful]);
        h.store.fail_next_target_load();

        let err = h.run().await.unwrap_err();

        assert!(matches!(
            err,
            RunError::Store {
                phase: RunPhase::PersistingScores,
                ..
            }
        ));
        assert_eq!(h.store.score_count(), 0);
        assert!(h.publisher.calls().is_empty());

        let summary = h.run().await.unwrap();
        assert_eq!(summary.labels_published, 1);
        assert_eq!(h.store.label_status(note), Some(LabelStatus::Proposed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_negated_by_transition_is_not_negated_again() {
        let h = Harness::new();
        let target = h.note(TargetType::Post);
        let counter = h.note(TargetType::Note);
        h.rate(target, &[NotHelpful; 6]);
        h.previous(target, NoteStatus::CurrentlyRatedHelpful);
        h.rate(counter, &[Helpful; 5]);
        let dispute = PendingDispute {
            id: Uuid::new_v4(),
            dispute_note_id: counter,
            target_note_id: target,
        };
        h.store.add_dispute(dispute.clone());

        let summary = h.run().await.unwrap();

        let negations = h
            .publisher
            .calls()
            .iter()
            .filter(|c| c.note_id == target && c.action == LabelAction::Negate)
            .count();
        assert_eq!(negations, 1);
        assert_eq!(summary.labels_negated, 1);
        assert_eq!(summary.disputes_approved, 1);
        assert_eq!(h.store.dispute_status(dispute.id), DisputeStatus::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negated_target_of_approved_dispute_stays_negated() {
        let h = Harness::new();
        let target = h.note(TargetType::Post);
        let counter = h.note(TargetType::Note);
        h.rate(target, &[Helpful; 5]);
        h.previous(target, NoteStatus::CurrentlyRatedHelpful);
        h.rate(counter, &[Helpful; 5]);
        h.store.add_dispute(PendingDispute {
            id: Uuid::new_v4(),
            dispute_note_id: counter,
            target_note_id: target,
        });

        h.run().await.unwrap();
        assert_eq!(h.store.label_status(target), Some(LabelStatus::Negated));

        let second = h.run().await.unwrap();
        assert_eq!(second.transitions, 0);
        assert_eq!(h.publisher.calls().len(), 1);
    }
}
