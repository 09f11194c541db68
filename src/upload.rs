use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{Dataset, DatasetApi, UploadFile};
use crate::auth::CredentialStore;
use crate::error::ClientError;
use crate::logging::{log, log_failure, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Success {
        dataset: Option<Dataset>,
    },
    Failure {
        reason: String,
    },
}

impl UploadStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadStatus::Success { .. })
    }

    pub fn line(&self) -> String {
        match self {
            UploadStatus::Idle => String::new(),
            UploadStatus::Uploading => "Uploading...".to_string(),
            UploadStatus::Success { .. } => "File uploaded successfully".to_string(),
            UploadStatus::Failure { reason } => format!("Upload failed: {}", reason),
        }
    }
}

/// File selection plus a single request/response cycle per submit.
///
/// Success is only reported through the returned status; refreshing the
/// history afterwards is the caller's job.
#[derive(Clone)]
pub struct UploadController {
    api: Arc<dyn DatasetApi>,
    credentials: CredentialStore,
    selected: Arc<Mutex<Option<PathBuf>>>,
    status: Arc<Mutex<UploadStatus>>,
}

impl UploadController {
    pub fn new(api: Arc<dyn DatasetApi>, credentials: CredentialStore) -> Self {
        Self {
            api,
            credentials,
            selected: Arc::new(Mutex::new(None)),
            status: Arc::new(Mutex::new(UploadStatus::Idle)),
        }
    }

    /// Replace the pending file.
    pub fn select_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        log(
            Level::Debug,
            Domain::Upload,
            "file_selected",
            obj(&[("path", v_str(&path.to_string_lossy()))]),
        );
        *relock(&self.selected) = Some(path);
    }

    pub fn selected_file(&self) -> Option<PathBuf> {
        relock(&self.selected).clone()
    }

    pub fn status(&self) -> UploadStatus {
        relock(&self.status).clone()
    }

    pub fn status_line(&self) -> String {
        self.status().line()
    }

    pub async fn submit(&self) -> Result<UploadStatus, ClientError> {
        let path = self.selected_file().ok_or(ClientError::NoFileSelected)?;
        self.set_status(UploadStatus::Uploading);

        let result = match read_upload(&path).await {
            Ok(file) => {
                log(
                    Level::Info,
                    Domain::Upload,
                    "submit",
                    obj(&[
                        ("file", v_str(&file.file_name)),
                        ("bytes", serde_json::json!(file.contents.len())),
                    ]),
                );
                let auth = self.credentials.auth_header_value();
                self.api.upload(file, &auth).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(dataset) => {
                log(
                    Level::Info,
                    Domain::Upload,
                    "uploaded",
                    obj(&[(
                        "dataset_id",
                        dataset.as_ref().map(|d| serde_json::json!(d.id)).unwrap_or_default(),
                    )]),
                );
                let status = UploadStatus::Success { dataset };
                self.set_status(status.clone());
                Ok(status)
            }
            Err(err) => {
                log_failure(Domain::Upload, "upload_failed", err.kind(), &err.to_string());
                let reason = match &err {
                    ClientError::UploadFailure(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.set_status(UploadStatus::Failure { reason });
                Err(err)
            }
        }
    }

    fn set_status(&self, status: UploadStatus) {
        *relock(&self.status) = status;
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn read_upload(path: &Path) -> Result<UploadFile, ClientError> {
    let contents = tokio::fs::read(path).await.map_err(|e| ClientError::FileRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());
    Ok(UploadFile { file_name, contents })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::api::memory::MemoryApi;

    fn controller(api: &Arc<MemoryApi>) -> UploadController {
        let api: Arc<dyn DatasetApi> = api.clone();
        UploadController::new(api, CredentialStore::with_credentials("alice", "secret"))
    }

    fn csv_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_submit_without_file_is_gated() {
        let api = Arc::new(MemoryApi::new());
        let upload = controller(&api);
        assert_eq!(upload.submit().await, Err(ClientError::NoFileSelected));
        assert_eq!(upload.status(), UploadStatus::Idle);
        assert_eq!(api.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let api = Arc::new(MemoryApi::new());
        let upload = controller(&api);
        let file = csv_file("Equipment Name,Type\nP-1,Pump\n");
        upload.select_file(file.path());

        let status = upload.submit().await.unwrap();
        assert!(status.is_success());
        match &status {
            UploadStatus::Success { dataset: Some(ds) } => {
                assert!(ds.original_filename.ends_with(".csv"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(upload.status_line(), "File uploaded successfully");
        assert_eq!(api.upload_calls(), 1);
    }

    #[tokio::test]
    async fn test_status_is_uploading_while_in_flight() {
        let api = Arc::new(MemoryApi::new());
        let upload = controller(&api);
        let file = csv_file("Equipment Name,Type\nP-1,Pump\n");
        upload.select_file(file.path());
        api.hold_uploads();

        let task = tokio::spawn({
            let upload = upload.clone();
            async move { upload.submit().await }
        });
        for _ in 0..200 {
            if api.upload_calls() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(api.upload_calls(), 1);
        assert_eq!(upload.status(), UploadStatus::Uploading);
        assert_eq!(upload.status_line(), "Uploading...");

        api.release_uploads();
        assert!(task.await.unwrap().unwrap().is_success());
        assert!(upload.status().is_success());
    }

    #[tokio::test]
    async fn test_server_rejection_surfaces_reason() {
        let api = Arc::new(MemoryApi::new());
        api.fail_upload(Some((400, "No file provided")));
        let upload = controller(&api);
        let file = csv_file("a,b\n");
        upload.select_file(file.path());

        let err = upload.submit().await.unwrap_err();
        assert_eq!(err, ClientError::UploadFailure("No file provided".into()));
        assert_eq!(upload.status_line(), "Upload failed: No file provided");
        // No automatic retry.
        assert_eq!(api.upload_calls(), 1);
    }

    #[tokio::test]
    async fn test_reselect_replaces_pending_file() {
        let api = Arc::new(MemoryApi::new());
        let upload = controller(&api);
        let first = csv_file("a\n");
        let second = csv_file("b\n");
        upload.select_file(first.path());
        upload.select_file(second.path());
        assert_eq!(upload.selected_file().as_deref(), Some(second.path()));
    }

    #[tokio::test]
    async fn test_unreadable_file_fails_without_request() {
        let api = Arc::new(MemoryApi::new());
        let upload = controller(&api);
        upload.select_file("/definitely/not/here.csv");

        let err = upload.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::FileRead { .. }));
        assert!(matches!(upload.status(), UploadStatus::Failure { .. }));
        assert_eq!(api.upload_calls(), 0);
    }
}
