use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a document moving through the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Processing,
    AwaitingReview,
    Completed,
    Failed,
}

/// Events that drive document status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    JobClaimed,
    JobCompleted,
    JobFailed,
    ReviewAccepted,
}

impl LifecycleEvent {
    /// The single (from, to) edge this event drives.
    pub fn edge(self) -> (DocumentStatus, DocumentStatus) {
        match self {
            LifecycleEvent::JobClaimed => (DocumentStatus::Queued, DocumentStatus::Processing),
            LifecycleEvent::JobCompleted => {
                (DocumentStatus::Processing, DocumentStatus::AwaitingReview)
            }
            LifecycleEvent::JobFailed => (DocumentStatus::Processing, DocumentStatus::Failed),
            LifecycleEvent::ReviewAccepted => {
                (DocumentStatus::AwaitingReview, DocumentStatus::Completed)
            }
        }
    }
}

impl DocumentStatus {
    /// Next status for an event, or None when the transition is illegal.
    pub fn next(self, event: LifecycleEvent) -> Option<DocumentStatus> {
        let (from, to) = event.edge();
        (self == from).then_some(to)
    }

    /// No automatic transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

/// A unit of uploaded work owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub status: DocumentStatus,
    pub owner_id: Uuid,
    pub size_bytes: i64,
    pub confidence_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_follow_the_table() {
        use DocumentStatus::*;
        use LifecycleEvent::*;

        assert_eq!(Queued.next(JobClaimed), Some(Processing));
        assert_eq!(Processing.next(JobCompleted), Some(AwaitingReview));
        assert_eq!(Processing.next(JobFailed), Some(Failed));
        assert_eq!(AwaitingReview.next(ReviewAccepted), Some(Completed));
    }

    #[test]
    fn terminal_states_reject_every_event() {
        use LifecycleEvent::*;

        for status in [DocumentStatus::Completed, DocumentStatus::Failed] {
            assert!(status.is_terminal());
            for event in [JobClaimed, JobCompleted, JobFailed, ReviewAccepted] {
                assert_eq!(status.next(event), None);
            }
        }
    }

    #[test]
    fn off_table_transitions_are_rejected() {
        use DocumentStatus::*;
        use LifecycleEvent::*;

        assert_eq!(Queued.next(JobCompleted), None);
        assert_eq!(Queued.next(ReviewAccepted), None);
        assert_eq!(Processing.next(JobClaimed), None);
        assert_eq!(AwaitingReview.next(JobCompleted), None);
        assert_eq!(AwaitingReview.next(JobFailed), None);
    }

    #[test]
    fn status_round_trips_through_persisted_spelling() {
        for (status, text) in [
            (DocumentStatus::Queued, "queued"),
            (DocumentStatus::Processing, "processing"),
            (DocumentStatus::AwaitingReview, "awaiting_review"),
            (DocumentStatus::Completed, "completed"),
            (DocumentStatus::Failed, "failed"),
        ] {
            assert_eq!(status.to_string(), text);
            assert_eq!(text.parse::<DocumentStatus>().unwrap(), status);
        }
    }
}
