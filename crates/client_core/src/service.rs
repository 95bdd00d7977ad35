use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ParameterSet, TaskId},
    error::ServiceErrorBody,
    protocol::{
        resolve_locator, GenerateRequest, GenerateResponse, HealthReport, RegenerateRequest,
        TaskStatusResponse,
    },
};

use crate::{config::ClientSettings, error::ServiceError};

/// Remote natural-language-to-CAD service as seen by the controller.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn create_task(&self, prompt: &str) -> Result<TaskId, ServiceError>;
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatusResponse, ServiceError>;
    async fn regenerate(
        &self,
        model_id: &str,
        parameters: &ParameterSet,
    ) -> Result<TaskId, ServiceError>;
    async fn health(&self) -> Result<HealthReport, ServiceError>;
    async fn fetch_artifact(&self, locator: &str) -> Result<Vec<u8>, ServiceError>;
}

pub struct HttpGenerationService {
    http: Client,
    api_url: String,
}

impl HttpGenerationService {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn create_task(&self, prompt: &str) -> Result<TaskId, ServiceError> {
        let res = self
            .http
            .post(self.endpoint("/api/generate"))
            .json(&GenerateRequest {
                prompt: prompt.to_string(),
            })
            .send()
            .await?;
        let body: GenerateResponse = decode_json(ensure_success(res).await?).await?;
        Ok(body.task_id)
    }

    async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatusResponse, ServiceError> {
        let res = self
            .http
            .get(self.endpoint(&format!("/api/tasks/{}", task_id.as_str())))
            .send()
            .await?;
        decode_json(ensure_success(res).await?).await
    }

    async fn regenerate(
        &self,
        model_id: &str,
        parameters: &ParameterSet,
    ) -> Result<TaskId, ServiceError> {
        let res = self
            .http
            .post(self.endpoint(&format!("/api/models/{model_id}/regenerate")))
            .json(&RegenerateRequest {
                parameters: parameters.clone(),
            })
            .send()
            .await?;
        let body: GenerateResponse = decode_json(ensure_success(res).await?).await?;
        Ok(body.task_id)
    }

    async fn health(&self) -> Result<HealthReport, ServiceError> {
        let res = self.http.get(self.endpoint("/api/health")).send().await?;
        decode_json(ensure_success(res).await?).await
    }

    async fn fetch_artifact(&self, locator: &str) -> Result<Vec<u8>, ServiceError> {
        let res = self
            .http
            .get(resolve_locator(&self.api_url, locator))
            .send()
            .await?;
        let bytes = ensure_success(res).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

async fn ensure_success(res: Response) -> Result<Response, ServiceError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let raw = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ServiceErrorBody>(&raw)
        .ok()
        .and_then(|body| body.message())
        .unwrap_or_default();
    Err(ServiceError::Rejected {
        status: status.as_u16(),
        message,
    })
}

// Reads the body as text first so a bad shape is reported as a payload problem, not transport.
async fn decode_json<T: DeserializeOwned>(res: Response) -> Result<T, ServiceError> {
    let raw = res.text().await?;
    serde_json::from_str(&raw).map_err(|err| ServiceError::MalformedPayload(err.to_string()))
}
