use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::note::NoteStatus;

/// One row of the score cache, written every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteScore {
    pub note_id: Uuid,
    pub intercept: f64,
    pub factor: f64,
    pub rating_count: u32,
    pub status: NoteStatus,
}
