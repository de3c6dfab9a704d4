use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Consensus status of a note, recomputed from scratch every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteStatus {
    /// Currently rated helpful.
    #[serde(rename = "CRH")]
    CurrentlyRatedHelpful,
    /// Currently rated not helpful.
    #[serde(rename = "CRNH")]
    CurrentlyRatedNotHelpful,
    /// Needs more ratings — the default for any rated note.
    #[serde(rename = "NMR")]
    NeedsMoreRatings,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::CurrentlyRatedHelpful => "CRH",
            NoteStatus::CurrentlyRatedNotHelpful => "CRNH",
            NoteStatus::NeedsMoreRatings => "NMR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CRH" => Some(NoteStatus::CurrentlyRatedHelpful),
            "CRNH" => Some(NoteStatus::CurrentlyRatedNotHelpful),
            "NMR" => Some(NoteStatus::NeedsMoreRatings),
            _ => None,
        }
    }
}

/// Mirror of the last label action taken against the note's post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStatus {
    None,
    Proposed,
    Published,
    Negated,
}

impl LabelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelStatus::None => "none",
            LabelStatus::Proposed => "proposed",
            LabelStatus::Published => "published",
            LabelStatus::Negated => "negated",
        }
    }

    /// Unknown values read back as `None` so a bad mirror never blocks a run.
    pub fn parse(value: &str) -> Self {
        match value {
            "proposed" => LabelStatus::Proposed,
            "published" => LabelStatus::Published,
            "negated" => LabelStatus::Negated,
            _ => LabelStatus::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Annotates a post directly.
    Post,
    /// Counter-note disputing another note.
    Note,
}

impl TargetType {
    pub fn parse(value: &str) -> Self {
        match value {
            "note" => TargetType::Note,
            _ => TargetType::Post,
        }
    }
}

/// The slice of a note the label and dispute steps need.
#[derive(Debug, Clone, FromRow)]
pub struct NoteTargetRow {
    pub id: Uuid,
    pub post_uri: String,
    pub target_type: String,
    pub label_status: String,
    pub dispute_approved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteTarget {
    pub note_id: Uuid,
    pub post_uri: String,
    pub target_type: TargetType,
    pub label_status: LabelStatus,
    /// An approved dispute has retracted this note's label.
    pub dispute_approved: bool,
}

impl From<NoteTargetRow> for NoteTarget {
    fn from(row: NoteTargetRow) -> Self {
        Self {
            note_id: row.id,
            post_uri: row.post_uri,
            target_type: TargetType::parse(&row.target_type),
            label_status: LabelStatus::parse(&row.label_status),
            dispute_approved: row.dispute_approved,
        }
    }
}
