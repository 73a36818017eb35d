use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{document_queries, extraction_queries, feedback_queries};
use crate::models::document::{Document, DocumentStatus, LifecycleEvent};
use crate::models::extraction::ExtractedField;
use crate::models::feedback::NewFeedbackRecord;
use crate::services::lifecycle::{DocumentLifecycle, LifecycleError};

/// Diff the reviewer's submission against the stored machine output.
/// Fields absent from the submission are unchanged; equal values produce
/// nothing; each mismatch yields exactly one correction delta.
pub fn diff_corrections(
    fields: &[ExtractedField],
    corrections: &HashMap<String, String>,
) -> Vec<NewFeedbackRecord> {
    fields
        .iter()
        .filter_map(|field| {
            corrections.get(&field.field_name).and_then(|submitted| {
                (submitted != &field.field_value).then(|| NewFeedbackRecord {
                    field_name: field.field_name.clone(),
                    ai_value: field.field_value.clone(),
                    human_value: submitted.clone(),
                })
            })
        })
        .collect()
}

#[derive(Debug)]
pub struct ReviewSummary {
    pub document: Document,
    pub changed_fields: usize,
}

/// Reconciles human corrections with machine output and drives the
/// document to its terminal state.
pub struct ReviewService {
    pool: PgPool,
    lifecycle: DocumentLifecycle,
}

impl ReviewService {
    pub fn new(pool: PgPool, lifecycle: DocumentLifecycle) -> Self {
        Self { pool, lifecycle }
    }

    /// Accept a review. The row lock plus the `awaiting_review`
    /// precondition serialize concurrent reviewers: the second submission
    /// is rejected once the first completes the document, identical
    /// values or not.
    pub async fn accept_review(
        &self,
        document_id: Uuid,
        corrections: &HashMap<String, String>,
        reviewer_id: Uuid,
    ) -> Result<ReviewSummary, ReviewError> {
        let mut tx = self.pool.begin().await?;

        let document = document_queries::lock_document(&mut *tx, document_id)
            .await?
            .ok_or(ReviewError::NotFound(document_id))?;
        if document.status != DocumentStatus::AwaitingReview {
            return Err(ReviewError::InvalidState {
                document_id,
                status: document.status,
            });
        }

        let fields = extraction_queries::list_for_document(&mut *tx, document_id).await?;
        let deltas = diff_corrections(&fields, corrections);
        for delta in &deltas {
            feedback_queries::insert_record(&mut *tx, document_id, reviewer_id, delta).await?;
        }

        let transition = self
            .lifecycle
            .apply_in_tx(&mut tx, document_id, LifecycleEvent::ReviewAccepted, None)
            .await?;
        tx.commit().await?;

        let document = self.lifecycle.finish(transition);
        metrics::counter!("feedback_records_total").increment(deltas.len() as u64);
        tracing::info!(
            document_id = %document_id,
            reviewer_id = %reviewer_id,
            changed_fields = deltas.len(),
            "Review accepted"
        );

        Ok(ReviewSummary {
            document,
            changed_fields: deltas.len(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("document {0} not found")]
    NotFound(Uuid),

    #[error("document {document_id} is not awaiting review (status: {status})")]
    InvalidState {
        document_id: Uuid,
        status: DocumentStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::extraction::BoundingBox;
    use chrono::Utc;

    fn stored_field(name: &str, value: &str) -> ExtractedField {
        ExtractedField {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            field_name: name.to_string(),
            field_value: value.to_string(),
            confidence_score: 0.9,
            bounding_box: BoundingBox {
                page: 1,
                left: 0.1,
                top: 0.1,
                width: 0.2,
                height: 0.05,
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn identical_values_produce_no_records() {
        let fields = vec![stored_field("total", "1250.00"), stored_field("date", "2026-03-01")];
        let corrections = HashMap::from([
            ("total".to_string(), "1250.00".to_string()),
            ("date".to_string(), "2026-03-01".to_string()),
        ]);

        assert!(diff_corrections(&fields, &corrections).is_empty());
    }

    #[test]
    fn a_changed_value_produces_exactly_one_record() {
        let fields = vec![stored_field("total", "1250.00")];
        let corrections = HashMap::from([("total".to_string(), "1205.00".to_string())]);

        let deltas = diff_corrections(&fields, &corrections);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field_name, "total");
        assert_eq!(deltas[0].ai_value, "1250.00");
        assert_eq!(deltas[0].human_value, "1205.00");
    }

    #[test]
    fn omitted_fields_are_treated_as_unchanged() {
        let fields = vec![stored_field("total", "1250.00"), stored_field("date", "2026-03-01")];
        let corrections = HashMap::from([("total".to_string(), "1205.00".to_string())]);

        let deltas = diff_corrections(&fields, &corrections);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field_name, "total");
    }

    #[test]
    fn corrections_for_unknown_fields_are_ignored() {
        let fields = vec![stored_field("total", "1250.00")];
        let corrections = HashMap::from([("made_up".to_string(), "anything".to_string())]);

        assert!(diff_corrections(&fields, &corrections).is_empty());
    }
}
