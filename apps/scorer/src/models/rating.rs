use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ternary helpfulness scale used by raters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Helpfulness {
    NotHelpful,
    SomewhatHelpful,
    Helpful,
}

impl Helpfulness {
    /// Numeric value fed to the consensus model.
    pub fn value(&self) -> f64 {
        match self {
            Helpfulness::NotHelpful => 0.0,
            Helpfulness::SomewhatHelpful => 0.5,
            Helpfulness::Helpful => 1.0,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_helpful" => Some(Helpfulness::NotHelpful),
            "somewhat_helpful" => Some(Helpfulness::SomewhatHelpful),
            "helpful" => Some(Helpfulness::Helpful),
            _ => None,
        }
    }
}

/// A rating joined with the rated note's author.
#[derive(Debug, Clone, FromRow)]
pub struct RatingRow {
    pub note_id: Uuid,
    pub rater_did: String,
    pub helpfulness: String,
    pub note_author_did: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub note_id: Uuid,
    pub rater_did: String,
    pub helpfulness: Helpfulness,
    pub note_author_did: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Rating {
    pub fn is_self_rating(&self) -> bool {
        self.note_author_did.as_deref() == Some(self.rater_did.as_str())
    }
}

impl TryFrom<RatingRow> for Rating {
    type Error = String;

    fn try_from(row: RatingRow) -> Result<Self, Self::Error> {
        let helpfulness = Helpfulness::parse(&row.helpfulness)
            .ok_or_else(|| format!("unknown helpfulness value '{}'", row.helpfulness))?;
        Ok(Rating {
            note_id: row.note_id,
            rater_did: row.rater_did,
            helpfulness,
            note_author_did: row.note_author_did,
            updated_at: row.updated_at,
        })
    }
}
