use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::json;

use crate::api::{Dataset, DatasetApi, DatasetId};
use crate::auth::CredentialStore;
use crate::error::ClientError;
use crate::logging::{log, log_failure, obj, Domain, Level};

/// The dataset list as last returned by the server.
///
/// A failed refresh keeps the previous list; summaries live in
/// [`SummaryCache`](crate::summary_cache::SummaryCache) and are not affected
/// by refreshes at all.
#[derive(Clone)]
pub struct HistoryStore {
    api: Arc<dyn DatasetApi>,
    credentials: CredentialStore,
    datasets: Arc<Mutex<Vec<Dataset>>>,
}

impl HistoryStore {
    pub fn new(api: Arc<dyn DatasetApi>, credentials: CredentialStore) -> Self {
        Self {
            api,
            credentials,
            datasets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reload the list; returns the number of datasets now held.
    pub async fn refresh(&self) -> Result<usize, ClientError> {
        if !self.credentials.is_complete() {
            log_failure(
                Domain::History,
                "refresh_rejected",
                ClientError::MissingCredentials.kind(),
                "credentials incomplete",
            );
            return Err(ClientError::MissingCredentials);
        }

        let auth = self.credentials.auth_header_value();
        let fresh = match self.api.list_datasets(&auth).await {
            Ok(list) => list,
            Err(err) => {
                log_failure(Domain::History, "refresh_failed", err.kind(), &err.to_string());
                return Err(err);
            }
        };

        let count = fresh.len();
        *self.lock() = fresh;
        log(
            Level::Info,
            Domain::History,
            "refreshed",
            obj(&[("count", json!(count))]),
        );
        Ok(count)
    }

    /// Snapshot in server order.
    pub fn datasets(&self) -> Vec<Dataset> {
        self.lock().clone()
    }

    pub fn get(&self, id: DatasetId) -> Option<Dataset> {
        self.lock().iter().find(|ds| ds.id == id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Dataset>> {
        self.datasets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
