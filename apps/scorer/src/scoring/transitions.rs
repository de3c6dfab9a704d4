//! Transition Detector — decides which scored notes need a label call this run.
//!
//! A note needs one when its status changed since the last run, or when its
//! `label_status` mirror still lags behind the stored status. The second case
//! picks up label calls that were deferred by the per-run cap or that failed,
//! since the score row already holds the new status by then.

use std::collections::HashMap;

use uuid::Uuid;

use crate::labels::LabelAction;
use crate::models::note::{LabelStatus, NoteStatus, NoteTarget, TargetType};
use crate::models::score::NoteScore;

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub note_id: Uuid,
    /// `None` when the note had no score row before this run.
    pub previous: Option<NoteStatus>,
    pub current: NoteStatus,
}

impl Transition {
    /// CRNH retracts; anything else publishes at the strength of the new status.
    pub fn action(&self) -> LabelAction {
        match self.current {
            NoteStatus::CurrentlyRatedNotHelpful => LabelAction::Negate,
            status => LabelAction::Publish(status),
        }
    }

    /// Status unchanged; only the label is catching up.
    pub fn is_catch_up(&self) -> bool {
        self.previous == Some(self.current)
    }
}

/// Whether the label on a note's post already reflects `status`. A note that
/// was never labelled needs no retraction.
pub fn label_matches(status: NoteStatus, label: LabelStatus) -> bool {
    match status {
        NoteStatus::CurrentlyRatedHelpful => label == LabelStatus::Published,
        NoteStatus::NeedsMoreRatings => label == LabelStatus::Proposed,
        NoteStatus::CurrentlyRatedNotHelpful => {
            matches!(label, LabelStatus::Negated | LabelStatus::None)
        }
    }
}

fn label_lags(status: NoteStatus, target: &NoteTarget) -> bool {
    // Counter-notes are never labelled, and an approved dispute owns the label.
    target.target_type == TargetType::Post
        && !target.dispute_approved
        && !label_matches(status, target.label_status)
}

/// Returns one transition per note that needs a label call, ordered negations
/// first, then strong publishes, then proposed publishes, ties by note id.
pub fn detect_transitions(
    scores: &[NoteScore],
    previous: &HashMap<Uuid, NoteStatus>,
    targets: &HashMap<Uuid, NoteTarget>,
) -> Vec<Transition> {
    let mut transitions: Vec<Transition> = scores
        .iter()
        .filter_map(|score| {
            let before = previous.get(&score.note_id).copied();
            let changed = before != Some(score.status);
            let lagging = targets
                .get(&score.note_id)
                .is_some_and(|target| label_lags(score.status, target));
            (changed || lagging).then(|| Transition {
                note_id: score.note_id,
                previous: before,
                current: score.status,
            })
        })
        .collect();

    transitions.sort_by_key(|t| (priority(t.current), t.note_id));
    transitions
}

fn priority(status: NoteStatus) -> u8 {
    match status {
        NoteStatus::CurrentlyRatedNotHelpful => 0,
        NoteStatus::CurrentlyRatedHelpful => 1,
        NoteStatus::NeedsMoreRatings => 2,
    }
}
