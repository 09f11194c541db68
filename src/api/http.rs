use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{Dataset, DatasetApi, DatasetId, ReportLink, Summary, UploadFile};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::logging::{log_request, v_str, ProfileScope};

const MAX_REASON_CHARS: usize = 200;

pub struct HttpApi {
    client: Client,
    cfg: ClientConfig,
}

impl HttpApi {
    pub fn new(cfg: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {}", e)))?;
        // Fail on a malformed base now rather than on the first request.
        cfg.endpoint("")?;
        Ok(Self { client, cfg })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, auth: &str) -> Result<T, ClientError> {
        let url = self.cfg.endpoint(path)?;
        let scope = ProfileScope::with_context("http_get", &[("endpoint", v_str(path))]);

        let resp = match self.client.get(url).header(AUTHORIZATION, auth).send().await {
            Ok(resp) => resp,
            Err(e) => {
                log_request("GET", path, None, scope.elapsed_ms());
                return Err(e.into());
            }
        };
        let status = resp.status();
        log_request("GET", path, Some(status.as_u16()), scope.elapsed_ms());

        if !status.is_success() {
            return Err(ClientError::AuthOrServerError {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Pick the most useful message out of an upload error response.
pub fn upload_failure_reason(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for key in ["error", "detail", "message"] {
            if let Some(Value::String(msg)) = map.get(key) {
                return msg.clone();
            }
        }
    }
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return format!("server rejected the file (HTTP {})", status.as_u16());
    }
    trimmed.chars().take(MAX_REASON_CHARS).collect()
}

#[async_trait]
impl DatasetApi for HttpApi {
    async fn list_datasets(&self, auth: &str) -> Result<Vec<Dataset>, ClientError> {
        self.get_json("datasets/", auth).await
    }

    async fn upload(&self, file: UploadFile, auth: &str) -> Result<Option<Dataset>, ClientError> {
        let path = "upload/";
        let url = self.cfg.endpoint(path)?;
        let part = Part::bytes(file.contents)
            .file_name(file.file_name)
            .mime_str("text/csv")
            .map_err(|e| ClientError::UploadFailure(e.to_string()))?;
        let form = Form::new().part("file", part);
        let scope = ProfileScope::with_context("http_upload", &[("endpoint", v_str(path))]);

        let resp = match self
            .client
            .post(url)
            .header(AUTHORIZATION, auth)
            .multipart(form)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                log_request("POST", path, None, scope.elapsed_ms());
                return Err(e.into());
            }
        };
        let status = resp.status();
        log_request("POST", path, Some(status.as_u16()), scope.elapsed_ms());
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ClientError::UploadFailure(upload_failure_reason(status, &body)));
        }

        // The dataset echo is informational; an unexpected body is still a success.
        Ok(serde_json::from_str::<Dataset>(&body).ok())
    }

    async fn fetch_summary(&self, id: DatasetId, auth: &str) -> Result<Summary, ClientError> {
        self.get_json(&format!("datasets/{}/summary/", id), auth).await
    }

    async fn report_url(&self, id: DatasetId, auth: &str) -> Result<String, ClientError> {
        let link: ReportLink = self.get_json(&format!("datasets/{}/report/", id), auth).await?;
        Ok(link.report_url)
    }
}
