use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a processing job in the durable work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Closed set of job kinds. Adding a kind extends the worker's dispatch
/// match, checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    DocumentProcessing,
}

/// One attempt-tracked unit of queued work, owned by exactly one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub document_id: Uuid,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Typed view of a `document_processing` payload. The queue itself treats
/// payloads as opaque JSON; only the worker's handler parses them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingPayload {
    pub file_path: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_type_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_persisted_spelling() {
        for (status, text) in [
            (JobStatus::Pending, "pending"),
            (JobStatus::Processing, "processing"),
            (JobStatus::Completed, "completed"),
            (JobStatus::Failed, "failed"),
        ] {
            assert_eq!(status.to_string(), text);
            assert_eq!(text.parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn job_kind_uses_wire_name() {
        assert_eq!(JobKind::DocumentProcessing.to_string(), "document_processing");
        assert_eq!(
            "document_processing".parse::<JobKind>().unwrap(),
            JobKind::DocumentProcessing
        );
    }

    #[test]
    fn payload_round_trips_without_optional_references() {
        let payload = ProcessingPayload {
            file_path: "documents/abc/report.pdf".to_string(),
            filename: "report.pdf".to_string(),
            building_id: None,
            revision_type_id: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("building_id").is_none());

        let parsed: ProcessingPayload = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.filename, "report.pdf");
    }
}
