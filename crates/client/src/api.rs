//! Typed HTTP client for the oilcast API.

use oilcast_core::job::{Job, StartedJob};
use oilcast_core::prediction::{PredictionRequest, PredictionResponse};
use oilcast_core::progress::TrainingMetrics;
use oilcast_core::types::JobId;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ClientError;

/// Error body returned by the API on every non-2xx response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// Subset of `GET /api/model/info` the client cares about.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub feature_names: Vec<String>,
    pub target_name: String,
    #[serde(default)]
    pub metrics: Option<TrainingMetrics>,
    pub model_exists: bool,
}

/// A dataset to upload with a training request.
#[derive(Debug, Clone)]
pub struct DatasetUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `POST /api/train`. Without an upload the server's default dataset is
    /// used.
    pub async fn start_training(
        &self,
        dataset: Option<DatasetUpload>,
    ) -> Result<StartedJob, ClientError> {
        let mut request = self.http.post(self.url("/api/train"));
        if let Some(upload) = dataset {
            let part = Part::bytes(upload.data)
                .file_name(upload.filename)
                .mime_str("text/csv")?;
            request = request.multipart(Form::new().part("file", part));
        }
        decode(request.send().await?).await
    }

    /// `GET /api/training/{task_id}`
    pub async fn job(&self, task_id: JobId) -> Result<Job, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/training/{task_id}")))
            .send()
            .await?;
        decode(response).await
    }

    /// Open `GET /api/training/progress`. The returned response streams
    /// event-stream frames until the job ends.
    pub async fn open_progress(&self, task_id: JobId) -> Result<Response, ClientError> {
        let response = self
            .http
            .get(self.url("/api/training/progress"))
            .query(&[("task_id", task_id.to_string())])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        check(response).await
    }

    /// `GET /api/model/info`
    pub async fn model_info(&self) -> Result<ModelSummary, ClientError> {
        decode(self.http.get(self.url("/api/model/info")).send().await?).await
    }

    /// `POST /api/predict`
    pub async fn predict(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictionResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/api/predict"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }
}

/// Turn a non-success response into [`ClientError::Api`].
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code, body.error),
        Err(_) => ("UNKNOWN".to_string(), text),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    Ok(check(response).await?.json().await?)
}
