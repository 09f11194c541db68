use std::time::Duration;

use url::Url;

use crate::error::ClientError;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base: String,
    pub timeout_secs: u64,
    pub offline: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: 30,
            offline: false,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var("CHEMVIZ_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            timeout_secs: std::env::var("CHEMVIZ_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            offline: matches!(std::env::var("CHEMVIZ_OFFLINE").as_deref(), Ok("1") | Ok("true")),
        }
    }

    pub fn with_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Resolve `path` (e.g. `datasets/3/summary/`) against the API base.
    ///
    /// The base is treated as a directory whether or not it ends in `/`.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let mut base = self.api_base.trim_end_matches('/').to_string();
        base.push('/');
        let base = Url::parse(&base)?;
        Ok(base.join(path.trim_start_matches('/'))?)
    }
}
