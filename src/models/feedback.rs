use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human correction event recorded during review. Only mismatches
/// between machine output and the reviewer's submission produce records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub field_name: String,
    pub ai_value: String,
    pub human_value: String,
    pub reviewer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A correction delta before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedbackRecord {
    pub field_name: String,
    pub ai_value: String,
    pub human_value: String,
}
