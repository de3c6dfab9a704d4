//! Read/write contract between the engine and the database.
//!
//! `ScoringStore` is what the orchestrator and dispute resolver depend on;
//! `PgScoringStore` is the production implementation over the tables in
//! `migrations/`. Every write is an idempotent per-row upsert or guarded update,
//! so a run that dies halfway is safe to repeat.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::dispute::{DisputeStatus, PendingDispute};
use crate::models::note::{LabelStatus, NoteStatus, NoteTarget, NoteTargetRow};
use crate::models::rating::{Rating, RatingRow};
use crate::models::score::NoteScore;

#[async_trait]
pub trait ScoringStore: Send + Sync {
    /// Full snapshot of current ratings, each joined with its note's author.
    async fn load_ratings(&self) -> Result<Vec<Rating>, sqlx::Error>;

    /// Stored status for each of `note_ids` that has a score row; absent means none.
    async fn load_previous_statuses(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, NoteStatus>, sqlx::Error>;

    /// Post URI, target type, label mirror and approved-dispute flag for each
    /// existing note in `note_ids`.
    async fn load_note_targets(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, NoteTarget>, sqlx::Error>;

    async fn load_pending_disputes(&self) -> Result<Vec<PendingDispute>, sqlx::Error>;

    /// Insert-or-update keyed by note id, in one statement.
    async fn upsert_scores(&self, scores: &[NoteScore]) -> Result<(), sqlx::Error>;

    /// Moves a pending dispute to a terminal status. Returns false if the dispute
    /// was no longer pending.
    async fn update_dispute_status(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error>;

    async fn update_label_status(
        &self,
        note_id: Uuid,
        status: LabelStatus,
    ) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct PgScoringStore {
    pool: PgPool,
}

impl PgScoringStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoringStore for PgScoringStore {
    async fn load_ratings(&self) -> Result<Vec<Rating>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RatingRow>(
            r#"
            SELECT r.note_id, r.rater_did, r.helpfulness,
                   n.author_did AS note_author_did, r.updated_at
            FROM community_note_ratings r
            JOIN community_notes n ON n.id = r.note_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let (note_id, rater_did) = (row.note_id, row.rater_did.clone());
                Rating::try_from(row)
                    .map_err(|e| warn!(%note_id, rater_did = %rater_did, "Skipping rating: {e}"))
                    .ok()
            })
            .collect())
    }

    async fn load_previous_statuses(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, NoteStatus>, sqlx::Error> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT note_id, status FROM community_note_scores WHERE note_id = ANY($1)",
        )
        .bind(note_ids)
        .fetch_all(&self.pool)
        .await?;

        // An unrecognised stored status reads as "no prior status", which forces
        // a transition and rewrites the row.
        Ok(rows
            .into_iter()
            .filter_map(|(id, status)| NoteStatus::parse(&status).map(|s| (id, s)))
            .collect())
    }

    async fn load_note_targets(
        &self,
        note_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, NoteTarget>, sqlx::Error> {
        let rows = sqlx::query_as::<_, NoteTargetRow>(
            r#"
            SELECT n.id, n.post_uri, n.target_type, n.label_status,
                   EXISTS (
                       SELECT 1 FROM community_note_disputes d
                       WHERE d.target_note_id = n.id AND d.status = 'approved'
                   ) AS dispute_approved
            FROM community_notes n
            WHERE n.id = ANY($1)
            "#,
        )
        .bind(note_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.id, NoteTarget::from(row)))
            .collect())
    }

    async fn load_pending_disputes(&self) -> Result<Vec<PendingDispute>, sqlx::Error> {
        sqlx::query_as::<_, PendingDispute>(
            r#"
            SELECT id, dispute_note_id, target_note_id
            FROM community_note_disputes
            WHERE status = 'pending'
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn upsert_scores(&self, scores: &[NoteScore]) -> Result<(), sqlx::Error> {
        if scores.is_empty() {
            return Ok(());
        }

        let note_ids: Vec<Uuid> = scores.iter().map(|s| s.note_id).collect();
        let intercepts: Vec<f64> = scores.iter().map(|s| s.intercept).collect();
        let factors: Vec<f64> = scores.iter().map(|s| s.factor).collect();
        let counts: Vec<i32> = scores
            .iter()
            .map(|s| i32::try_from(s.rating_count).unwrap_or(i32::MAX))
            .collect();
        let statuses: Vec<&str> = scores.iter().map(|s| s.status.as_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO community_note_scores
                (note_id, intercept, factor, rating_count, status, scored_at)
            SELECT u.note_id, u.intercept, u.factor, u.rating_count, u.status, now()
            FROM UNNEST($1::uuid[], $2::float8[], $3::float8[], $4::int4[], $5::text[])
                AS u(note_id, intercept, factor, rating_count, status)
            ON CONFLICT (note_id) DO UPDATE SET
                intercept = EXCLUDED.intercept,
                factor = EXCLUDED.factor,
                rating_count = EXCLUDED.rating_count,
                status = EXCLUDED.status,
                scored_at = EXCLUDED.scored_at
            "#,
        )
        .bind(&note_ids)
        .bind(&intercepts)
        .bind(&factors)
        .bind(&counts)
        .bind(&statuses)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_dispute_status(
        &self,
        dispute_id: Uuid,
        status: DisputeStatus,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        // The status guard keeps approved/rejected terminal even if two runs overlap.
        let result = sqlx::query(
            r#"
            UPDATE community_note_disputes
            SET status = $2, resolved_at = $3
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(dispute_id)
        .bind(status.as_str())
        .bind(resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_label_status(
        &self,
        note_id: Uuid,
        status: LabelStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE community_notes SET label_status = $2 WHERE id = $1")
            .bind(note_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
