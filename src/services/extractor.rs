use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use crate::models::extraction::NewExtractedField;

/// Fallback instructions used when no prompt version has been activated
/// for the extraction prompt name.
pub const DEFAULT_PROMPT: &str = concat!(
    "Extract every data field from this document as a JSON array. Each entry ",
    "must have field_name, field_value, confidence_score (a number between 0 ",
    "and 1) and bounding_box with page, left, top, width and height. ",
    "Return ONLY valid JSON."
);

/// Client for the Cloudflare Workers AI extraction model. The pipeline
/// treats the model as an opaque processor: bytes and a prompt in,
/// structured fields out.
pub struct WorkersAiClient {
    http: Client,
    account_id: String,
    api_token: String,
}

#[derive(Deserialize)]
struct ModelResponse {
    result: ModelResult,
}

#[derive(Deserialize)]
struct ModelResult {
    response: String,
}

impl WorkersAiClient {
    pub fn new(account_id: &str, api_token: &str) -> Self {
        Self {
            http: Client::new(),
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
        }
    }

    /// Send document bytes through the extraction model and parse its
    /// reply into structured fields.
    pub async fn extract_fields(
        &self,
        document_bytes: &[u8],
        prompt_text: &str,
        parameters: &serde_json::Value,
    ) -> Result<Vec<NewExtractedField>, ExtractError> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/@cf/meta/llama-3.2-11b-vision-instruct",
            self.account_id
        );

        let max_tokens = parameters
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(1024);

        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(document_bytes),
            "prompt": prompt_text,
            "max_tokens": max_tokens,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await
            .map_err(ExtractError::Http)?;

        let reply: ModelResponse = response.json().await.map_err(ExtractError::Http)?;

        parse_model_reply(&reply.result.response)
    }
}

/// Parse the model's reply; it is instructed to return a bare JSON array
/// of field objects.
fn parse_model_reply(reply: &str) -> Result<Vec<NewExtractedField>, ExtractError> {
    serde_json::from_str(reply).map_err(ExtractError::Parse)
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse model response as extracted fields: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_reply_parses_into_fields() {
        let reply = r#"[
            {
                "field_name": "total",
                "field_value": "1250.00",
                "confidence_score": 0.94,
                "bounding_box": {"page": 1, "left": 0.62, "top": 0.81, "width": 0.11, "height": 0.03}
            },
            {
                "field_name": "inspection_date",
                "field_value": "2026-03-01",
                "confidence_score": 0.88,
                "bounding_box": {"page": 1, "left": 0.1, "top": 0.12, "width": 0.2, "height": 0.03}
            }
        ]"#;

        let fields = parse_model_reply(reply).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field_name, "total");
        assert_eq!(fields[1].bounding_box.page, 1);
    }

    #[test]
    fn prose_reply_is_a_parse_error() {
        let reply = "Sure! Here are the extracted fields: total is 1250.00";
        assert!(matches!(
            parse_model_reply(reply),
            Err(ExtractError::Parse(_))
        ));
    }
}
