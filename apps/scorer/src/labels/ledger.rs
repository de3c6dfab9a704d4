//! Books the results of dispatched label operations: per-run counters plus the
//! `label_status` mirror on each note that was successfully labelled.

use tracing::warn;

use crate::labels::queue::LabelOutcome;
use crate::labels::LabelAction;
use crate::store::ScoringStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelTally {
    pub published: usize,
    pub negated: usize,
    pub failed: usize,
    pub deferred: usize,
}

/// Counts each outcome and mirrors successful actions onto the note row.
/// A mirror write failure is logged only; the label itself already landed.
pub async fn settle(
    store: &dyn ScoringStore,
    outcomes: &[LabelOutcome],
    tally: &mut LabelTally,
) {
    for outcome in outcomes {
        if !outcome.succeeded() {
            tally.failed += 1;
            continue;
        }

        match outcome.op.action {
            LabelAction::Publish(_) => tally.published += 1,
            LabelAction::Negate => tally.negated += 1,
        }

        let mirrored = outcome.op.action.resulting_status();
        if let Err(e) = store.update_label_status(outcome.op.note_id, mirrored).await {
            warn!(
                note_id = %outcome.op.note_id,
                "Failed to record label status {}: {e}",
                mirrored.as_str()
            );
        }
    }
}
