use std::collections::HashMap;

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::document::{Document, DocumentStatus};
use crate::models::extraction::ExtractedField;

/// Per-file outcome of a batch upload. Failures are isolated: one bad
/// file never aborts the rest of the batch.
#[derive(Debug, Serialize)]
pub struct UploadFileOutcome {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub results: Vec<UploadFileOutcome>,
}

/// Document as returned to clients; storage internals stay private.
#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub filename: String,
    pub status: DocumentStatus,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename.clone(),
            status: doc.status,
            size_bytes: doc.size_bytes,
            confidence_score: doc.confidence_score,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            processed_at: doc.processed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: DocumentSummary,
    pub extracted_fields: Vec<ExtractedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

/// Reviewer-submitted corrections, keyed by field name. Fields omitted
/// from the map are treated as unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[garde(length(max = 500))]
    pub corrected_fields: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    pub changed_fields: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PromptCreateRequest {
    #[garde(length(min = 1, max = 100))]
    pub name: String,

    #[garde(length(min = 1))]
    pub prompt_text: String,

    #[garde(skip)]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PromptActivateRequest {
    /// Version to activate for the prompt name in the request path.
    pub id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_create_rejects_empty_name() {
        let request = PromptCreateRequest {
            name: String::new(),
            prompt_text: "Extract the report fields.".to_string(),
            parameters: None,
        };
        assert!(request.validate().is_err());

        let request = PromptCreateRequest {
            name: "extract_review_report_data".to_string(),
            prompt_text: "Extract the report fields.".to_string(),
            parameters: None,
        };
        assert!(request.validate().is_ok());
    }
}
