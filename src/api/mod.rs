use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::ClientError;

pub mod http;
pub mod memory;

pub type DatasetId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiKind {
    Http,
    Memory,
}

impl ApiKind {
    pub fn from_config(cfg: &ClientConfig) -> Self {
        if cfg.offline {
            ApiKind::Memory
        } else {
            ApiKind::Http
        }
    }

    pub fn build(self, cfg: ClientConfig) -> Result<Arc<dyn DatasetApi>, ClientError> {
        match self {
            ApiKind::Http => Ok(Arc::new(http::HttpApi::new(cfg)?)),
            ApiKind::Memory => Ok(Arc::new(memory::MemoryApi::demo())),
        }
    }
}

/// One uploaded CSV as listed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub original_filename: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub pdf_report: Option<String>,
}

/// Analytics computed server-side for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub type_distribution: BTreeMap<String, u64>,
    /// `None` when the column was missing from the upload.
    #[serde(default)]
    pub averages: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// A CSV file read from disk, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportLink {
    pub report_url: String,
}

/// The REST surface consumed by the client.
///
/// `auth` is the full `Authorization` header value, read from the
/// credential store by the caller immediately before each call.
#[async_trait]
pub trait DatasetApi: Send + Sync {
    async fn list_datasets(&self, auth: &str) -> Result<Vec<Dataset>, ClientError>;
    /// Returns the created dataset when the server echoes it back.
    async fn upload(&self, file: UploadFile, auth: &str) -> Result<Option<Dataset>, ClientError>;
    async fn fetch_summary(&self, id: DatasetId, auth: &str) -> Result<Summary, ClientError>;
    async fn report_url(&self, id: DatasetId, auth: &str) -> Result<String, ClientError>;
}
