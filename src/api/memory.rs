//! In-process implementation of [`DatasetApi`].
//!
//! Backs the offline console mode and the test suites. It behaves like the
//! real service from the client's point of view: newest datasets first,
//! optional credential checking, and per-endpoint fault injection. Summary
//! and upload responses can be held back to make in-flight states observable.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::watch;

use crate::api::{Dataset, DatasetApi, DatasetId, Summary, UploadFile};
use crate::auth::basic_auth_value;
use crate::error::ClientError;

#[derive(Default)]
struct MemoryState {
    datasets: Vec<Dataset>,
    summaries: HashMap<DatasetId, Summary>,
    next_id: DatasetId,
    accepted_auth: Option<String>,
    list_failure: Option<u16>,
    summary_failures: HashMap<DatasetId, u16>,
    upload_failure: Option<(u16, String)>,
    seen_auth: Vec<String>,
    list_calls: usize,
    upload_calls: usize,
    summary_calls: HashMap<DatasetId, usize>,
}

impl MemoryState {
    fn record(&mut self, auth: &str) {
        self.seen_auth.push(auth.to_string());
    }

    fn authorized(&self, auth: &str) -> bool {
        self.accepted_auth.as_deref().map_or(true, |ok| ok == auth)
    }
}

pub struct MemoryApi {
    state: Mutex<MemoryState>,
    summaries_open: watch::Sender<bool>,
    uploads_open: watch::Sender<bool>,
}

impl Default for MemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryApi {
    pub fn new() -> Self {
        let (summaries_open, _) = watch::channel(true);
        let (uploads_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..Default::default()
            }),
            summaries_open,
            uploads_open,
        }
    }

    /// Two small equipment datasets, for trying the console without a server.
    pub fn demo() -> Self {
        let api = Self::new();
        api.insert(
            "pumps.csv",
            Summary {
                total_count: 42,
                type_distribution: [("Pump".to_string(), 30), ("Valve".to_string(), 12)]
                    .into_iter()
                    .collect(),
                averages: [
                    ("Flowrate".to_string(), Some(3.5)),
                    ("Pressure".to_string(), Some(6.25)),
                    ("Temperature".to_string(), None),
                ]
                .into_iter()
                .collect(),
                columns: vec!["Equipment Name".into(), "Type".into(), "Flowrate".into(), "Pressure".into()],
            },
        );
        api.insert(
            "reactors.csv",
            Summary {
                total_count: 9,
                type_distribution: [
                    ("Reactor".to_string(), 4),
                    ("Condenser".to_string(), 3),
                    ("Compressor".to_string(), 2),
                ]
                .into_iter()
                .collect(),
                averages: [("Temperature".to_string(), Some(118.333))].into_iter().collect(),
                columns: vec!["Equipment Name".into(), "Type".into(), "Temperature".into()],
            },
        );
        api
    }

    /// Register a dataset with its summary; returns the assigned id.
    pub fn insert(&self, original_filename: &str, summary: Summary) -> DatasetId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let uploaded_at = Utc
            .timestamp_opt(1_704_067_200 + id as i64 * 3600, 0)
            .single()
            .unwrap_or_else(Utc::now);
        state.datasets.insert(
            0,
            Dataset {
                id,
                original_filename: original_filename.to_string(),
                uploaded_at,
                pdf_report: Some(format!("http://127.0.0.1:8000/media/reports/{}_report.pdf", id)),
            },
        );
        state.summaries.insert(id, summary);
        id
    }

    /// Replace a dataset's report link (`None` mimics a missing report).
    pub fn set_report(&self, id: DatasetId, url: Option<&str>) {
        let mut state = self.lock();
        if let Some(ds) = state.datasets.iter_mut().find(|d| d.id == id) {
            ds.pdf_report = url.map(str::to_string);
        }
    }

    pub fn remove(&self, id: DatasetId) {
        self.lock().datasets.retain(|d| d.id != id);
    }

    /// Only accept requests carrying these credentials.
    pub fn require_credentials(&self, username: &str, password: &str) {
        self.lock().accepted_auth = Some(basic_auth_value(username, password));
    }

    pub fn fail_list(&self, status: Option<u16>) {
        self.lock().list_failure = status;
    }

    pub fn fail_summary(&self, id: DatasetId, status: Option<u16>) {
        let mut state = self.lock();
        match status {
            Some(s) => state.summary_failures.insert(id, s),
            None => state.summary_failures.remove(&id),
        };
    }

    pub fn fail_upload(&self, failure: Option<(u16, &str)>) {
        self.lock().upload_failure = failure.map(|(s, msg)| (s, msg.to_string()));
    }

    /// Summary requests are accepted but not answered until released.
    pub fn hold_summaries(&self) {
        self.summaries_open.send_replace(false);
    }

    pub fn release_summaries(&self) {
        self.summaries_open.send_replace(true);
    }

    /// Upload requests are accepted but not answered until released.
    pub fn hold_uploads(&self) {
        self.uploads_open.send_replace(false);
    }

    pub fn release_uploads(&self) {
        self.uploads_open.send_replace(true);
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn upload_calls(&self) -> usize {
        self.lock().upload_calls
    }

    pub fn summary_calls(&self, id: DatasetId) -> usize {
        self.lock().summary_calls.get(&id).copied().unwrap_or(0)
    }

    /// Every `Authorization` value received, in arrival order.
    pub fn seen_auth(&self) -> Vec<String> {
        self.lock().seen_auth.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn wait_open(gate: &watch::Sender<bool>) {
    let mut open = gate.subscribe();
    // The sender outlives the wait, so this only ends once released.
    let _ = open.wait_for(|open| *open).await;
}

fn count_rows(contents: &[u8]) -> (u64, Vec<String>) {
    let text = String::from_utf8_lossy(contents);
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let columns = lines
        .next()
        .map(|h| h.split(',').map(|c| c.trim().to_string()).collect())
        .unwrap_or_default();
    (lines.count() as u64, columns)
}

#[async_trait]
impl DatasetApi for MemoryApi {
    async fn list_datasets(&self, auth: &str) -> Result<Vec<Dataset>, ClientError> {
        let mut state = self.lock();
        state.list_calls += 1;
        state.record(auth);
        if !state.authorized(auth) {
            return Err(ClientError::AuthOrServerError { status: 401 });
        }
        if let Some(status) = state.list_failure {
            return Err(ClientError::AuthOrServerError { status });
        }
        Ok(state.datasets.clone())
    }

    async fn upload(&self, file: UploadFile, auth: &str) -> Result<Option<Dataset>, ClientError> {
        {
            let mut state = self.lock();
            state.upload_calls += 1;
            state.record(auth);
        }
        wait_open(&self.uploads_open).await;
        {
            let state = self.lock();
            if !state.authorized(auth) {
                return Err(ClientError::UploadFailure("Invalid username/password.".to_string()));
            }
            if let Some((_, reason)) = &state.upload_failure {
                return Err(ClientError::UploadFailure(reason.clone()));
            }
        }
        let (total_count, columns) = count_rows(&file.contents);
        let id = self.insert(
            &file.file_name,
            Summary {
                total_count,
                columns,
                ..Default::default()
            },
        );
        let state = self.lock();
        Ok(state.datasets.iter().find(|d| d.id == id).cloned())
    }

    async fn fetch_summary(&self, id: DatasetId, auth: &str) -> Result<Summary, ClientError> {
        {
            let mut state = self.lock();
            *state.summary_calls.entry(id).or_insert(0) += 1;
            state.record(auth);
        }

        wait_open(&self.summaries_open).await;

        let state = self.lock();
        if !state.authorized(auth) {
            return Err(ClientError::AuthOrServerError { status: 401 });
        }
        if let Some(status) = state.summary_failures.get(&id) {
            return Err(ClientError::AuthOrServerError { status: *status });
        }
        state
            .summaries
            .get(&id)
            .cloned()
            .ok_or(ClientError::AuthOrServerError { status: 404 })
    }

    async fn report_url(&self, id: DatasetId, auth: &str) -> Result<String, ClientError> {
        let mut state = self.lock();
        state.record(auth);
        if !state.authorized(auth) {
            return Err(ClientError::AuthOrServerError { status: 401 });
        }
        state
            .datasets
            .iter()
            .find(|d| d.id == id)
            .and_then(|d| d.pdf_report.clone())
            .ok_or(ClientError::AuthOrServerError { status: 404 })
    }
}
