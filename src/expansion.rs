use serde_json::json;

use crate::api::DatasetId;
use crate::logging::{log, obj, Domain, Level};
use crate::summary_cache::SummaryCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Collapsed(DatasetId),
    Expanded(DatasetId),
}

/// Single-selection expansion: at most one dataset is open.
pub struct ExpansionController {
    expanded: Option<DatasetId>,
    cache: SummaryCache,
}

impl ExpansionController {
    pub fn new(cache: SummaryCache) -> Self {
        Self {
            expanded: None,
            cache,
        }
    }

    pub fn expanded(&self) -> Option<DatasetId> {
        self.expanded
    }

    pub fn is_expanded(&self, id: DatasetId) -> bool {
        self.expanded == Some(id)
    }

    /// Collapse `id` if it is open, otherwise open it and make sure its
    /// summary is on the way. A fetch still running for the previously open
    /// dataset is left alone.
    pub fn toggle(&mut self, id: DatasetId) -> Toggle {
        if self.expanded == Some(id) {
            self.expanded = None;
            log(Level::Debug, Domain::View, "collapsed", obj(&[("dataset_id", json!(id))]));
            return Toggle::Collapsed(id);
        }

        self.expanded = Some(id);
        log(Level::Debug, Domain::View, "expanded", obj(&[("dataset_id", json!(id))]));
        self.cache.prefetch(id);
        Toggle::Expanded(id)
    }

    /// Close whatever is open, without touching the cache.
    pub fn collapse(&mut self) -> Option<DatasetId> {
        let closed = self.expanded.take();
        if let Some(id) = closed {
            log(Level::Debug, Domain::View, "collapsed", obj(&[("dataset_id", json!(id))]));
        }
        closed
    }
}
