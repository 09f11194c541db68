//! Per-dataset summary cache with request deduplication.
//!
//! Entry lifecycle: absent -> pending -> resolved | failed. A failed entry is
//! fetched again on the next request; a resolved entry is final for the
//! session. At most one outbound fetch per dataset id exists at any time: the
//! pending check and the insertion of the in-flight future happen under the
//! same lock, and every later caller awaits a clone of that future.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;

use crate::api::{DatasetApi, DatasetId, Summary};
use crate::auth::CredentialStore;
use crate::error::ClientError;
use crate::logging::{log, log_cache_transition, obj, v_str, Domain, Level, ProfileScope};

pub type SummaryResult = Result<Arc<Summary>, ClientError>;
type InFlight = Shared<BoxFuture<'static, SummaryResult>>;

/// Observable state of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Absent,
    Pending,
    Resolved(Arc<Summary>),
    Failed(ClientError),
}

impl CacheEntry {
    pub fn label(&self) -> &'static str {
        match self {
            CacheEntry::Absent => "absent",
            CacheEntry::Pending => "pending",
            CacheEntry::Resolved(_) => "resolved",
            CacheEntry::Failed(_) => "failed",
        }
    }

    pub fn summary(&self) -> Option<&Arc<Summary>> {
        match self {
            CacheEntry::Resolved(s) => Some(s),
            _ => None,
        }
    }
}

enum Slot {
    Pending(InFlight),
    Resolved(Arc<Summary>),
    Failed(ClientError),
}

impl Slot {
    fn entry(&self) -> CacheEntry {
        match self {
            Slot::Pending(_) => CacheEntry::Pending,
            Slot::Resolved(s) => CacheEntry::Resolved(Arc::clone(s)),
            Slot::Failed(e) => CacheEntry::Failed(e.clone()),
        }
    }
}

enum Lookup {
    Ready(Arc<Summary>),
    InFlight(InFlight),
}

struct CacheInner {
    api: Arc<dyn DatasetApi>,
    credentials: CredentialStore,
    slots: Mutex<HashMap<DatasetId, Slot>>,
    fetches: AtomicU64,
}

impl CacheInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<DatasetId, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(&self, id: DatasetId, result: &SummaryResult) {
        let mut slots = self.slots();
        if matches!(slots.get(&id), Some(Slot::Resolved(_))) {
            return;
        }
        match result {
            Ok(summary) => {
                slots.insert(id, Slot::Resolved(Arc::clone(summary)));
                log_cache_transition(id, "pending", "resolved");
            }
            Err(err) => {
                slots.insert(id, Slot::Failed(err.clone()));
                log_cache_transition(id, "pending", "failed");
                log(
                    Level::Warn,
                    Domain::Summary,
                    "fetch_failed",
                    obj(&[
                        ("dataset_id", json!(id)),
                        ("kind", v_str(err.kind())),
                        ("msg", v_str(&err.to_string())),
                    ]),
                );
            }
        }
    }
}

/// Cheap clonable handle; clones share one cache.
#[derive(Clone)]
pub struct SummaryCache {
    inner: Arc<CacheInner>,
}

impl SummaryCache {
    pub fn new(api: Arc<dyn DatasetApi>, credentials: CredentialStore) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                api,
                credentials,
                slots: Mutex::new(HashMap::new()),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Current state of `id`, without side effects.
    pub fn get(&self, id: DatasetId) -> CacheEntry {
        self.inner
            .slots()
            .get(&id)
            .map(Slot::entry)
            .unwrap_or(CacheEntry::Absent)
    }

    /// Resolve the summary for `id`, fetching it only if no value is cached
    /// and no fetch is already running.
    pub async fn ensure_fetched(&self, id: DatasetId) -> SummaryResult {
        match self.lookup(id) {
            Lookup::Ready(summary) => Ok(summary),
            Lookup::InFlight(fetch) => fetch.await,
        }
    }

    /// Start fetching `id` if needed without waiting for the result.
    ///
    /// The fetch is driven by a spawned task, so it completes and populates
    /// the cache even if nobody awaits it. Outside a Tokio runtime the fetch
    /// only makes progress once something calls [`ensure_fetched`].
    ///
    /// [`ensure_fetched`]: SummaryCache::ensure_fetched
    pub fn prefetch(&self, id: DatasetId) {
        let _ = self.lookup(id);
    }

    /// Outbound summary requests issued so far this session.
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    pub fn resolved_ids(&self) -> Vec<DatasetId> {
        let mut ids: Vec<DatasetId> = self
            .inner
            .slots()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Resolved(_)))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn lookup(&self, id: DatasetId) -> Lookup {
        let mut slots = self.inner.slots();
        let from = match slots.get(&id) {
            Some(Slot::Resolved(summary)) => return Lookup::Ready(Arc::clone(summary)),
            Some(Slot::Pending(fetch)) => return Lookup::InFlight(fetch.clone()),
            Some(Slot::Failed(_)) => "failed",
            None => "absent",
        };
        let fetch = self.start_fetch(id);
        slots.insert(id, Slot::Pending(fetch.clone()));
        log_cache_transition(id, from, "pending");
        Lookup::InFlight(fetch)
    }

    // Caller holds the slot lock; `settle` blocks on it, so the pending slot
    // is always in place before the result lands.
    fn start_fetch(&self, id: DatasetId) -> InFlight {
        let inner = Arc::clone(&self.inner);
        let auth = inner.credentials.auth_header_value();
        inner.fetches.fetch_add(1, Ordering::SeqCst);

        let fetch = async move {
            let _scope = ProfileScope::with_context("summary_fetch", &[("dataset_id", json!(id))]);
            let result = inner.api.fetch_summary(id, &auth).await.map(Arc::new);
            inner.settle(id, &result);
            result
        }
        .boxed()
        .shared();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(fetch.clone());
        }
        fetch
    }
}
