//! Render-time view state.
//!
//! Rows are rebuilt from the current store and cache contents on every
//! render, so fetches that complete out of order can never leave a panel
//! showing another dataset's data or a stale loading state.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::api::{Dataset, DatasetId};
use crate::chart::{to_series, ChartSeries};
use crate::error::ClientError;
use crate::expansion::ExpansionController;
use crate::history::HistoryStore;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::summary_cache::{CacheEntry, SummaryCache};

/// Modal showing one dataset's PDF report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReportViewer {
    #[default]
    Closed,
    Open {
        dataset_id: DatasetId,
        url: String,
    },
}

impl ReportViewer {
    pub fn open(&mut self, dataset: &Dataset) -> Result<&str, ClientError> {
        let url = dataset
            .pdf_report
            .clone()
            .ok_or(ClientError::ReportUnavailable { id: dataset.id })?;
        Ok(self.open_url(dataset.id, url))
    }

    pub fn open_url(&mut self, dataset_id: DatasetId, url: String) -> &str {
        log(
            Level::Info,
            Domain::View,
            "report_opened",
            obj(&[("dataset_id", json!(dataset_id)), ("url", v_str(&url))]),
        );
        *self = ReportViewer::Open { dataset_id, url };
        match self {
            ReportViewer::Open { url, .. } => url.as_str(),
            ReportViewer::Closed => "",
        }
    }

    pub fn close(&mut self) {
        *self = ReportViewer::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ReportViewer::Open { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ReportViewer::Open { url, .. } => Some(url),
            ReportViewer::Closed => None,
        }
    }

    pub fn dataset_id(&self) -> Option<DatasetId> {
        match self {
            ReportViewer::Open { dataset_id, .. } => Some(*dataset_id),
            ReportViewer::Closed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Panel {
    Loading,
    Ready {
        total_count: u64,
        series: ChartSeries,
        report_url: Option<String>,
    },
    Unavailable {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub id: DatasetId,
    pub title: String,
    pub uploaded_at: DateTime<Utc>,
    pub expanded: bool,
    /// Only expanded rows carry a panel.
    pub panel: Option<Panel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub rows: Vec<DatasetRow>,
    pub report: Option<String>,
}

impl DashboardView {
    pub fn derive(
        history: &HistoryStore,
        expansion: &ExpansionController,
        cache: &SummaryCache,
        viewer: &ReportViewer,
    ) -> Self {
        let rows = history
            .datasets()
            .into_iter()
            .map(|ds| {
                let expanded = expansion.is_expanded(ds.id);
                let panel = expanded.then(|| panel_for(&ds, cache.get(ds.id)));
                DatasetRow {
                    id: ds.id,
                    title: ds.original_filename,
                    uploaded_at: ds.uploaded_at,
                    expanded,
                    panel,
                }
            })
            .collect();
        Self {
            rows,
            report: viewer.url().map(str::to_string),
        }
    }

    pub fn expanded_row(&self) -> Option<&DatasetRow> {
        self.rows.iter().find(|r| r.expanded)
    }
}

fn panel_for(ds: &Dataset, entry: CacheEntry) -> Panel {
    match entry {
        // Absent only shows up between toggle and the fetch starting.
        CacheEntry::Absent | CacheEntry::Pending => Panel::Loading,
        CacheEntry::Resolved(summary) => Panel::Ready {
            total_count: summary.total_count,
            series: to_series(&summary),
            report_url: ds.pdf_report.clone(),
        },
        CacheEntry::Failed(err) => Panel::Unavailable {
            reason: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dataset(id: DatasetId, report: Option<&str>) -> Dataset {
        Dataset {
            id,
            original_filename: format!("{}.csv", id),
            uploaded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            pdf_report: report.map(str::to_string),
        }
    }

    #[test]
    fn test_viewer_open_close() {
        let mut viewer = ReportViewer::default();
        assert!(!viewer.is_open());
        let url = viewer.open(&dataset(1, Some("http://x/1.pdf"))).unwrap().to_string();
        assert_eq!(url, "http://x/1.pdf");
        assert_eq!(viewer.dataset_id(), Some(1));
        viewer.close();
        assert_eq!(viewer, ReportViewer::Closed);
        assert_eq!(viewer.url(), None);
    }

    #[test]
    fn test_viewer_rejects_missing_report() {
        let mut viewer = ReportViewer::default();
        let err = viewer.open(&dataset(2, None)).unwrap_err();
        assert_eq!(err, ClientError::ReportUnavailable { id: 2 });
        assert!(!viewer.is_open());
    }

    #[test]
    fn test_panel_follows_cache_state() {
        let ds = dataset(1, Some("http://x/1.pdf"));
        assert_eq!(panel_for(&ds, CacheEntry::Pending), Panel::Loading);
        assert!(matches!(
            panel_for(&ds, CacheEntry::Failed(ClientError::AuthOrServerError { status: 404 })),
            Panel::Unavailable { .. }
        ));
        let summary = crate::api::Summary {
            total_count: 2,
            type_distribution: [("Pump".to_string(), 2)].into_iter().collect(),
            ..Default::default()
        };
        match panel_for(&ds, CacheEntry::Resolved(std::sync::Arc::new(summary))) {
            Panel::Ready { total_count, series, report_url } => {
                assert_eq!(total_count, 2);
                assert_eq!(series.categories, vec!["Pump"]);
                assert_eq!(report_url.as_deref(), Some("http://x/1.pdf"));
            }
            other => panic!("unexpected panel {:?}", other),
        }
    }
}
