use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactKind, ParameterSet, TaskId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerateRequest {
    pub parameters: ParameterSet,
}

/// Body of `GET /api/tasks/{task_id}`, discriminated on `status`.
///
/// Any status other than `completed` or `failed` (`processing`, `queued`,
/// ...) is treated as still in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatusResponse {
    Completed {
        result: TaskResult,
    },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(other)]
    Processing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub parameters: ParameterSet,
    /// Artifact kind (`stl`, `python`, ...) to a locator relative to the service base URL.
    #[serde(default)]
    pub downloads: BTreeMap<String, String>,
}

impl TaskResult {
    pub fn download_locator(&self, kind: ArtifactKind) -> Option<&str> {
        self.downloads.get(kind.key()).map(String::as_str)
    }

    pub fn download_url(&self, base_url: &str, kind: ArtifactKind) -> Option<String> {
        self.download_locator(kind)
            .map(|locator| resolve_locator(base_url, locator))
    }
}

/// Joins a service-relative locator onto the base URL. Absolute locators pass through.
pub fn resolve_locator(base_url: &str, locator: &str) -> String {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        return locator.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if locator.starts_with('/') {
        format!("{base}{locator}")
    } else {
        format!("{base}/{locator}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_reads_as_processing() {
        let body = r#"{"task_id":"task_1","status":"queued"}"#;
        let parsed: TaskStatusResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed, TaskStatusResponse::Processing);
    }

    #[test]
    fn failed_status_without_error_text() {
        let body = r#"{"task_id":"task_1","status":"failed","error":null}"#;
        let parsed: TaskStatusResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed, TaskStatusResponse::Failed { error: None });
    }

    #[test]
    fn completed_status_requires_result() {
        let body = r#"{"task_id":"task_1","status":"completed"}"#;
        assert!(serde_json::from_str::<TaskStatusResponse>(body).is_err());
    }

    #[test]
    fn completed_result_reads_loose_parameters() {
        let body = r#"{
            "status": "completed",
            "result": {
                "model_id": "model_9",
                "code": "import cadquery as cq",
                "parameters": {
                    "length": {"value": 100, "unit": "mm", "min": 20.0, "max": 300.0},
                    "width": {"value": "40"},
                    "thickness": {"value": null, "unit": "mm"}
                },
                "downloads": {
                    "stl": "/api/models/model_9/download?format=stl",
                    "python": "/api/models/model_9/download?format=py"
                }
            }
        }"#;
        let TaskStatusResponse::Completed { result } =
            serde_json::from_str::<TaskStatusResponse>(body).expect("parse")
        else {
            panic!("expected completed status");
        };

        assert_eq!(result.model_id.as_deref(), Some("model_9"));
        assert_eq!(result.parameters["length"].value, Some(100.0));
        assert_eq!(result.parameters["length"].max, Some(300.0));
        assert_eq!(result.parameters["width"].value, Some(40.0));
        assert_eq!(result.parameters["thickness"].value, None);
        assert_eq!(
            result.download_url("http://localhost:8000/", ArtifactKind::Stl),
            Some("http://localhost:8000/api/models/model_9/download?format=stl".to_string())
        );
    }

    #[test]
    fn null_unit_does_not_reject_the_result() {
        let body = r#"{
            "status": "completed",
            "result": {
                "parameters": {
                    "length": {"value": 120, "unit": null, "min": 20, "max": 300},
                    "angle": {"value": 45, "unit": 90}
                }
            }
        }"#;
        let TaskStatusResponse::Completed { result } =
            serde_json::from_str::<TaskStatusResponse>(body).expect("parse")
        else {
            panic!("expected completed status");
        };

        assert_eq!(result.parameters["length"].unit, "");
        assert_eq!(result.parameters["length"].value, Some(120.0));
        assert_eq!(result.parameters["angle"].unit, "90");
    }

    #[test]
    fn resolve_locator_handles_relative_and_absolute() {
        assert_eq!(
            resolve_locator("http://svc:8000", "files/a.stl"),
            "http://svc:8000/files/a.stl"
        );
        assert_eq!(
            resolve_locator("http://svc:8000", "https://cdn.example/a.stl"),
            "https://cdn.example/a.stl"
        );
    }
}
