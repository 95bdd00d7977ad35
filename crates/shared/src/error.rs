use serde::{Deserialize, Serialize};

/// Error body returned by the generation service on non-success responses.
///
/// The service reports validation and lookup failures as `{"detail": ...}`
/// and task failures as `{"error": ...}`; either may be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceErrorBody {
    pub fn detail(message: impl Into<String>) -> Self {
        Self {
            detail: Some(serde_json::Value::String(message.into())),
            error: None,
        }
    }

    pub fn message(&self) -> Option<String> {
        let detail = match &self.detail {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        detail
            .or_else(|| self.error.clone())
            .filter(|message| !message.trim().is_empty())
    }
}
