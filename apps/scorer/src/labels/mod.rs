//! Label Publisher seam — the only path by which the engine touches moderation
//! labels on posts. The HTTP client and the rate-limited queue both live here.

pub mod client;
pub mod ledger;
pub mod queue;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::note::{LabelStatus, NoteStatus};

/// Strong annotation, applied to CRH notes.
pub const HELPFUL_LABEL: &str = "community-note";
/// Weaker annotation, applied while a note still needs ratings.
pub const PROPOSED_LABEL: &str = "proposed-community-note";

#[derive(Debug, Error)]
pub enum LabelerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Labeler error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Label call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid labeler configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelAction {
    /// Apply or refresh the label matching this status (CRH strong, NMR proposed).
    Publish(NoteStatus),
    /// Retract every label this engine applies.
    Negate,
}

impl LabelAction {
    /// Label values to create and to negate for this action.
    pub fn label_vals(&self) -> (Vec<&'static str>, Vec<&'static str>) {
        match self {
            LabelAction::Publish(NoteStatus::CurrentlyRatedHelpful) => {
                (vec![HELPFUL_LABEL], vec![PROPOSED_LABEL])
            }
            LabelAction::Publish(_) => (vec![PROPOSED_LABEL], vec![HELPFUL_LABEL]),
            LabelAction::Negate => (vec![], vec![HELPFUL_LABEL, PROPOSED_LABEL]),
        }
    }

    /// Mirror value written to the note after the action succeeds.
    pub fn resulting_status(&self) -> LabelStatus {
        match self {
            LabelAction::Publish(NoteStatus::CurrentlyRatedHelpful) => LabelStatus::Published,
            LabelAction::Publish(_) => LabelStatus::Proposed,
            LabelAction::Negate => LabelStatus::Negated,
        }
    }
}

/// Why a label operation was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOrigin {
    Transition,
    Dispute(Uuid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelOp {
    pub note_id: Uuid,
    pub post_uri: String,
    pub action: LabelAction,
    pub origin: LabelOrigin,
}

/// External label service. Implementations must be safe to call repeatedly
/// with the same arguments.
#[async_trait]
pub trait LabelPublisher: Send + Sync {
    async fn publish_label(
        &self,
        note_id: Uuid,
        post_uri: &str,
        status: NoteStatus,
    ) -> Result<(), LabelerError>;

    async fn negate_label(&self, note_id: Uuid, post_uri: &str) -> Result<(), LabelerError>;
}
