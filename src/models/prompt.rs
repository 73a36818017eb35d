use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a prompt version. At most one version per name is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PromptStatus {
    Draft,
    Active,
    Archived,
}

/// Versioned configuration consumed by the extraction processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: Uuid,
    pub name: String,
    pub version: i32,
    pub prompt_text: String,
    pub parameters: serde_json::Value,
    pub status: PromptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_status_round_trips_through_persisted_spelling() {
        for (status, text) in [
            (PromptStatus::Draft, "draft"),
            (PromptStatus::Active, "active"),
            (PromptStatus::Archived, "archived"),
        ] {
            assert_eq!(status.to_string(), text);
            assert_eq!(text.parse::<PromptStatus>().unwrap(), status);
        }
    }
}
