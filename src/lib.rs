//! Client for the chemical-equipment dataset service.
//!
//! Upload CSV files, browse the upload history, and inspect each dataset's
//! analytics summary and PDF report. Summaries are fetched lazily, at most
//! once per dataset per session.

pub mod api;
pub mod auth;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod expansion;
pub mod history;
pub mod logging;
pub mod summary_cache;
pub mod upload;
pub mod view;

pub use api::{Dataset, DatasetApi, DatasetId, Summary};
pub use auth::CredentialStore;
pub use dashboard::Dashboard;
pub use error::ClientError;
