//! In-memory `ScoringStore` and recording `LabelPublisher` for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::labels::{LabelAction, LabelPublisher, LabelerError};
use crate::models::dispute::{DisputeStatus, PendingDispute};
use crate::models::note::{LabelStatus, NoteStatus, NoteTarget};
use crate::models::rating::Rating;
use crate::models::score::NoteScore;
use crate::store::ScoringStore;

struct DisputeRecord {
    dispute: PendingDispute,
    status: DisputeStatus,
    resolved_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    ratings: Vec<Rating>,
    notes: HashMap<Uuid, NoteTarget>,
    scores: HashMap<Uuid, NoteScore>,
    disputes: Vec<DisputeRecord>,
    fail_rating_loads: bool,
    fail_score_upserts: bool,
    fail_next_target_load: bool,
    fail_dispute_updates: bool,
    /// Store calls in the order they happened.
    log: Vec<&'static str>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_note(&self, note: NoteTarget) {
        self.with(|s| s.notes.insert(note.note_id, note));
    }

    pub fn add_rating(&self, rating: Rating) {
        self.with(|s| s.ratings.push(rating));
    }

    pub fn add_dispute(&self, dispute: PendingDispute) {
        self.with(|s| {
            s.disputes.push(DisputeRecord {
                dispute,
                status: DisputeStatus::Pending,
                resolved_at: None,
            })
        });
    }

    pub fn set_score(&self, score: NoteScore) {
        self.with(|s| s.scores.insert(score.note_id, score));
    }

    pub fn fail_rating_loads(&self) {
        self.with(|s| s.fail_rating_loads = true);
    }

    pub fn fail_score_upserts(&self) {
        self.with(|s| s.fail_score_upserts = true);
    }

    /// The next `load_note_targets` call fails; later calls succeed.
    pub fn fail_next_target_load(&self) {
        self.with(|s| s.fail_next_target_load = true);
    }

    pub fn set_label_status(&self, note_id: Uuid, status: LabelStatus) {
        self.with(|s| {
            if let Some(note) = s.notes.get_mut(&note_id) {
                note.label_status = status;
            }
        });
    }

    pub fn fail_dispute_updates(&self) {
        self.with(|s| s.fail_dispute_updates = true);
    }

    pub fn score(&self, note_id: Uuid) -> Option<NoteScore> {
        self.with(|s| s.scores.get(&note_id).cloned())
    }

    pub fn score_count(&self) -> usize {
        self.with(|s| s.scores.len())
    }

    pub fn label_status(&self, note_id: Uuid) -> Option<LabelStatus> {
        self.with(|s| s.notes.get(&note_id).map(|n| n.label_status))
    }

    pub fn dispute_status(&self, dispute_id: Uuid) -> DisputeStatus {
        self.with(|s| {
            s.disputes
                .iter()
                .find(|r| r.dispute.id == dispute_id)
                .map(|r| r.status)
                .unwrap()
        })
    }

    pub fn dispute_resolved_at(&self, dispute_id: Uuid) -> Option<DateTime<Utc>> {
        self.with(|s| {
            s.disputes
                .iter()
                .find(|r| r.dispute.id == dispute_id)
                .and_then(|r| r.resolved_at)
        })
    }

    pub fn log(&self) -> Vec<&'static str> {
        self.with(|s| s.log.clone())
    }
}

fn unavailable() -> sqlx::Error {
    sqlx::Error::PoolTimedOut
}

#[async_trait]
impl ScoringStore for MemoryStore {
    async fn load_ratings(&self) -> Result<Vec<Rating>, sqlx::Error> {
        self.with(|s| {
            s.log.push("load_ratings");
            if s.fail_rating_loads {
                return Err(unavailable());
            }
            Ok(s.ratings.clone())
        })
    }

    async fn load_previous_statuses(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, NoteStatus>, sqlx::Error> {
        self.with(|s| {
            s.log.push("load_previous_statuses");
            Ok(note_ids
                .iter()
                .filter_map(|id| s.scores.get(id).map(|score| (*id, score.status)))
                .collect())
        })
    }

    async fn load_note_targets(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, NoteTarget>, sqlx::Error> {
        self.with(|s| {
            s.log.push("load_note_targets");
            if std::mem::take(&mut s.fail_next_target_load) {
                return Err(unavailable());
            }
            Ok(note_ids
                .iter()
                .filter_map(|id| {
                    let mut note = s.notes.get(id)?.clone();
                    note.dispute_approved = s.disputes.iter().any(|r| {
                        r.dispute.target_note_id == *id && r.status == DisputeStatus::Approved
                    });
                    Some((*id, note))
                })
                .collect())
        })
    }

    async fn load_pending_disputes(&self) -> Result<Vec<PendingDispute>, sqlx::Error> {
        self.with(|s| {
            s.log.push("load_pending_disputes");
            Ok(s.disputes
                .iter()
                .filter(|r| r.status == DisputeStatus::Pending)
                .map(|r| r.dispute.clone())
                .collect())
        })
    }

    async fn upsert_scores(&self, scores: &[NoteScore]) -> Result<(), sqlx::Error> {
        self.with(|s| {
            s.log.push("upsert_scores");
            if s.fail_score_upserts {
                return Err(unavailable());
            }
            for score in scores {
                s.scores.insert(score.note_id, score.clone());
            }
            Ok(())
        })
    }

    async fn update_dispute_status(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        self.with(|s| {
            s.log.push("update_dispute_status");
            if s.fail_dispute_updates {
                return Err(unavailable());
            }
            match s
                .disputes
                .iter_mut()
                .find(|r| r.dispute.id == dispute_id && r.status == DisputeStatus::Pending)
            {
                Some(record) => {
                    record.status = status;
                    record.resolved_at = Some(resolved_at);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    async fn update_label_status(
        &self,
        note_id: Uuid,
        status: LabelStatus,
    ) -> Result<(), sqlx::Error> {
        self.with(|s| {
            s.log.push("update_label_status");
            if let Some(note) = s.notes.get_mut(&note_id) {
                note.label_status = status;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct LabelCall {
    pub note_id: Uuid,
    pub post_uri: String,
    pub action: LabelAction,
    pub at: Instant,
}

#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<LabelCall>>,
    failing: Mutex<HashSet<Uuid>>,
}

impl RecordingPublisher {
    pub fn fail_for(&self, note_id: Uuid) {
        self.failing.lock().unwrap().insert(note_id);
    }

    pub fn recover(&self, note_id: Uuid) {
        self.failing.lock().unwrap().remove(&note_id);
    }

    pub fn calls(&self) -> Vec<LabelCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(
        &self,
        note_id: Uuid,
        post_uri: &str,
        action: LabelAction,
    ) -> Result<(), LabelerError> {
        self.calls.lock().unwrap().push(LabelCall {
            note_id,
            post_uri: post_uri.to_string(),
            action,
            at: Instant::now(),
        });
        if self.failing.lock().unwrap().contains(&note_id) {
            return Err(LabelerError::Api {
                status: 503,
                message: "labeler unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LabelPublisher for RecordingPublisher {
    async fn publish_label(
        &self,
        note_id: Uuid,
        post_uri: &str,
        status: NoteStatus,
    ) -> Result<(), LabelerError> {
        self.record(note_id, post_uri, LabelAction::Publish(status))
    }

    async fn negate_label(&self, note_id: Uuid, post_uri: &str) -> Result<(), LabelerError> {
        self.record(note_id, post_uri, LabelAction::Negate)
    }
}
