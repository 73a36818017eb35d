use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Location of an extracted value on the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub page: u32,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One machine-produced datum tied to a document. Immutable once written;
/// corrections are recorded as feedback, never as overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub id: Uuid,
    pub document_id: Uuid,
    pub field_name: String,
    pub field_value: String,
    pub confidence_score: f64,
    pub bounding_box: BoundingBox,
    pub created_at: DateTime<Utc>,
}

/// A field as reported by the extraction processor, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExtractedField {
    pub field_name: String,
    pub field_value: String,
    pub confidence_score: f64,
    pub bounding_box: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_uses_exact_wire_shape() {
        let bbox = BoundingBox {
            page: 2,
            left: 0.1,
            top: 0.25,
            width: 0.3,
            height: 0.05,
        };

        let value = serde_json::to_value(&bbox).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 5);
        for key in ["page", "left", "top", "width", "height"] {
            assert!(object.contains_key(key), "missing bounding box key {key}");
        }
    }
}
