//! Job payload carried by queue messages.
//!
//! The wire shape is `{ "textPrompt": string, "itemId": string }`. Producers may
//! add fields over time; unknown fields are kept in [`ImageJobPayload::extra`] so
//! a requeued job carries them forward unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{DomainError, DomainResult};
use crate::id::ItemId;

/// Payload of a "generate an image for this item" job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageJobPayload {
    pub text_prompt: String,
    pub item_id: ItemId,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ImageJobPayload {
    pub fn new(text_prompt: impl Into<String>, item_id: ItemId) -> Self {
        Self {
            text_prompt: text_prompt.into(),
            item_id,
            extra: Map::new(),
        }
    }

    /// Parse a payload as it came off the queue.
    ///
    /// Queue backends hand back either a JSON object or a JSON string holding a
    /// serialized object; both forms are accepted.
    pub fn from_json(value: &JsonValue) -> DomainResult<Self> {
        let parsed: Self = match value {
            JsonValue::String(raw) => serde_json::from_str(raw)
                .map_err(|e| DomainError::validation(format!("payload is not valid JSON: {e}")))?,
            other => serde_json::from_value(other.clone())
                .map_err(|e| DomainError::validation(format!("payload shape mismatch: {e}")))?,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Normalized object form, used when a job is requeued.
    pub fn to_json(&self) -> JsonValue {
        let mut object = self.extra.clone();
        object.insert("textPrompt".to_string(), JsonValue::String(self.text_prompt.clone()));
        object.insert(
            "itemId".to_string(),
            JsonValue::String(self.item_id.as_str().to_string()),
        );
        JsonValue::Object(object)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.item_id.is_blank() {
            return Err(DomainError::invalid_id("itemId must not be blank"));
        }
        if self.text_prompt.trim().is_empty() {
            return Err(DomainError::validation("textPrompt must not be blank"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_object_payload() {
        let payload =
            ImageJobPayload::from_json(&json!({"textPrompt": "red linen shirt", "itemId": "42"}))
                .unwrap();
        assert_eq!(payload.text_prompt, "red linen shirt");
        assert_eq!(payload.item_id.as_str(), "42");
        assert!(payload.extra.is_empty());
    }

    #[test]
    fn parses_string_encoded_payload() {
        let raw = json!(r#"{"textPrompt":"denim jacket","itemId":"abc"}"#);
        let payload = ImageJobPayload::from_json(&raw).unwrap();
        assert_eq!(payload.item_id.as_str(), "abc");
    }

    #[test]
    fn keeps_unknown_fields_across_requeue() {
        let payload = ImageJobPayload::from_json(&json!({
            "textPrompt": "wool coat",
            "itemId": "7",
            "userId": "u-1",
            "attempt": 3
        }))
        .unwrap();

        let requeued = payload.to_json();
        assert_eq!(requeued["userId"], json!("u-1"));
        assert_eq!(requeued["attempt"], json!(3));
        assert_eq!(requeued["itemId"], json!("7"));
        assert_eq!(ImageJobPayload::from_json(&requeued).unwrap(), payload);
    }

    #[test]
    fn rejects_malformed_payloads() {
        for bad in [
            json!("not json at all {"),
            json!({"textPrompt": "no item"}),
            json!({"itemId": "1"}),
            json!({"textPrompt": "x", "itemId": ""}),
            json!({"textPrompt": "  ", "itemId": "1"}),
            json!(17),
            JsonValue::Null,
        ] {
            assert!(
                matches!(
                    ImageJobPayload::from_json(&bad),
                    Err(DomainError::Validation(_) | DomainError::InvalidId(_))
                ),
                "expected rejection for {bad}"
            );
        }
    }
}
