//! Status Classifier — maps a fitted note intercept and rating count to a status.
//!
//! Stateless and total: every scored note is reclassified from scratch each run.
//! The note factor only shapes the fit; it plays no part here.

use crate::models::note::NoteStatus;
use crate::models::score::NoteScore;
use crate::scoring::matrix_factorization::FitResult;
use crate::scoring::params::ScoringConfig;

pub fn classify(intercept: f64, rating_count: u32, config: &ScoringConfig) -> NoteStatus {
    if intercept >= config.helpful_threshold && rating_count >= config.min_ratings_for_helpful {
        NoteStatus::CurrentlyRatedHelpful
    } else if intercept <= config.not_helpful_threshold {
        NoteStatus::CurrentlyRatedNotHelpful
    } else {
        NoteStatus::NeedsMoreRatings
    }
}

/// Builds the score rows for every note in the fit, in note-id order.
pub fn score_notes(fit: &FitResult, config: &ScoringConfig) -> Vec<NoteScore> {
    fit.notes
        .iter()
        .map(|(note_id, params)| NoteScore {
            note_id: *note_id,
            intercept: params.intercept,
            factor: params.factor,
            rating_count: params.rating_count,
            status: classify(params.intercept, params.rating_count, config),
        })
        .collect()
}
