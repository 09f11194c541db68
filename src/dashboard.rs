use std::sync::Arc;

use crate::api::{DatasetApi, DatasetId};
use crate::auth::CredentialStore;
use crate::error::ClientError;
use crate::expansion::{ExpansionController, Toggle};
use crate::history::HistoryStore;
use crate::logging::{log_failure, Domain};
use crate::summary_cache::{SummaryCache, SummaryResult};
use crate::upload::{UploadController, UploadStatus};
use crate::view::{DashboardView, ReportViewer};

/// Outcome of [`Dashboard::upload`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    /// Set when the upload worked but the follow-up history refresh did not.
    pub refresh_error: Option<ClientError>,
}

/// All client components wired over one API handle.
pub struct Dashboard {
    pub credentials: CredentialStore,
    pub uploads: UploadController,
    pub history: HistoryStore,
    pub summaries: SummaryCache,
    pub expansion: ExpansionController,
    pub viewer: ReportViewer,
    api: Arc<dyn DatasetApi>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn DatasetApi>) -> Self {
        let credentials = CredentialStore::new();
        let summaries = SummaryCache::new(Arc::clone(&api), credentials.clone());
        Self {
            uploads: UploadController::new(Arc::clone(&api), credentials.clone()),
            history: HistoryStore::new(Arc::clone(&api), credentials.clone()),
            expansion: ExpansionController::new(summaries.clone()),
            summaries,
            credentials,
            viewer: ReportViewer::default(),
            api,
        }
    }

    /// Submit the selected file; on success reload the history.
    pub async fn upload(&self) -> Result<UploadOutcome, ClientError> {
        let status = self.uploads.submit().await?;
        let refresh_error = if status.is_success() {
            self.history.refresh().await.err()
        } else {
            None
        };
        Ok(UploadOutcome {
            status,
            refresh_error,
        })
    }

    /// Reload the history. An expanded dataset that is no longer listed is
    /// collapsed; its cached summary stays.
    pub async fn refresh(&mut self) -> Result<usize, ClientError> {
        let count = self.history.refresh().await?;
        if let Some(id) = self.expansion.expanded() {
            if self.history.get(id).is_none() {
                self.expansion.collapse();
                if self.viewer.dataset_id() == Some(id) {
                    self.viewer.close();
                }
            }
        }
        Ok(count)
    }

    /// Expand or collapse a listed dataset. Collapsing also closes its
    /// report viewer.
    pub fn toggle(&mut self, id: DatasetId) -> Result<Toggle, ClientError> {
        if self.history.get(id).is_none() && !self.expansion.is_expanded(id) {
            return Err(ClientError::UnknownDataset { id });
        }
        let toggle = self.expansion.toggle(id);
        if let Toggle::Collapsed(id) = toggle {
            if self.viewer.dataset_id() == Some(id) {
                self.viewer.close();
            }
        }
        Ok(toggle)
    }

    /// Wait for the expanded dataset's summary, if any.
    pub async fn expanded_summary(&self) -> Option<SummaryResult> {
        let id = self.expansion.expanded()?;
        Some(self.summaries.ensure_fetched(id).await)
    }

    /// Show a dataset's PDF, asking the report endpoint when the listing
    /// carries no link.
    pub async fn open_report(&mut self, id: DatasetId) -> Result<String, ClientError> {
        let dataset = self.history.get(id).ok_or(ClientError::UnknownDataset { id })?;
        if dataset.pdf_report.is_some() {
            return self.viewer.open(&dataset).map(str::to_string);
        }

        let auth = self.credentials.auth_header_value();
        match self.api.report_url(id, &auth).await {
            Ok(url) => Ok(self.viewer.open_url(id, url).to_string()),
            Err(err) => {
                log_failure(Domain::View, "report_lookup_failed", err.kind(), &err.to_string());
                Err(ClientError::ReportUnavailable { id })
            }
        }
    }

    pub fn close_report(&mut self) {
        self.viewer.close();
    }

    pub fn view(&self) -> DashboardView {
        DashboardView::derive(&self.history, &self.expansion, &self.summaries, &self.viewer)
    }
}
