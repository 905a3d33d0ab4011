//! The extension catalog engine.
//!
//! Two unreliable sources feed one record store: registry searches driven by
//! the active query, and the host runtime's installed plugin list. Every
//! mutating operation commits inside one critical section of the shared state
//! lock and emits a single [`CatalogEvent::Changed`] afterwards.

mod detail;
mod installed;
pub mod notify;
pub mod query;
mod search;
pub mod store;

#[cfg(test)]
mod catalog_tests;

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, broadcast, watch};

use crate::host::HostRuntime;
use crate::markdown::ReadmeRenderer;
use crate::model::config::CatalogConfig;
use crate::model::extension::{ExtensionId, ExtensionRecord};
use crate::registry::RegistryClient;

pub use notify::{CatalogEvent, Outcome, ProgressSink, TracingProgress};
pub use query::EpochToken;
pub use store::ExtensionStore;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot resolve extension {id}")]
    CannotResolve { id: ExtensionId },
}

#[derive(Debug, Default)]
struct CatalogState {
    store: ExtensionStore,
    installed: BTreeSet<ExtensionId>,
    search_result: BTreeSet<ExtensionId>,
    /// Query that produced `search_result`.
    search_query: String,
    /// Token of the current search cycle. Swapped only under the state lock.
    epoch: EpochToken,
}

struct Inner {
    state: Mutex<CatalogState>,
    query: watch::Sender<String>,
    registry: Arc<dyn RegistryClient>,
    host: Arc<dyn HostRuntime>,
    notifier: notify::Notifier,
    renderer: ReadmeRenderer,
    extension_engine: String,
    debounce: Duration,
    refresh_limit: Option<Arc<Semaphore>>,
}

/// Cheaply cloneable handle to the catalog.
#[derive(Clone)]
pub struct ExtensionCatalog {
    inner: Arc<Inner>,
}

impl ExtensionCatalog {
    pub fn new(
        config: &CatalogConfig,
        registry: Arc<dyn RegistryClient>,
        host: Arc<dyn HostRuntime>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let (query, _) = watch::channel(String::new());
        let refresh_limit = (config.max_concurrent_refreshes > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_refreshes)));

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CatalogState::default()),
                query,
                registry,
                host,
                notifier: notify::Notifier::new(progress),
                renderer: ReadmeRenderer::new(config.readme_extra_tags.iter().cloned()),
                extension_engine: config.extension_engine.clone(),
                debounce: config.debounce(),
                refresh_limit,
            }),
        }
    }

    /// Spawns the query debouncer and the host listener, then reconciles the
    /// installed set once. Must be called from within a tokio runtime.
    pub async fn start(&self) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(query::debounce_queries(
            self.inner.query.subscribe(),
            self.inner.debounce,
            move |query| match weak.upgrade() {
                Some(inner) => {
                    ExtensionCatalog { inner }.start_search_cycle(query);
                    true
                }
                None => false,
            },
        ));

        let host_changes = self.inner.host.subscribe();
        self.reconcile_installed().await;
        tokio::spawn(listen_to_host(Arc::downgrade(&self.inner), host_changes));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.inner.notifier.subscribe()
    }

    pub fn query(&self) -> String {
        self.inner.query.borrow().clone()
    }

    /// Updates the active query; a search follows once typing pauses.
    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        let changed = self.inner.query.send_if_modified(|current| {
            if *current == query {
                return false;
            }
            current.clone_from(&query);
            true
        });

        if changed {
            self.inner.notifier.emit(CatalogEvent::QueryChanged(query));
        }
    }

    pub fn installed(&self) -> BTreeSet<ExtensionId> {
        self.inner.state.lock().installed.clone()
    }

    pub fn search_result(&self) -> BTreeSet<ExtensionId> {
        self.inner.state.lock().search_result.clone()
    }

    /// The query whose results are currently committed, which may lag
    /// behind [`Self::query`] while a search is pending.
    pub fn search_query(&self) -> String {
        self.inner.state.lock().search_query.clone()
    }

    pub fn get_extension(&self, id: &ExtensionId) -> Option<ExtensionRecord> {
        self.inner.state.lock().store.get(id).cloned()
    }

    /// Search-result records ordered by label.
    pub fn search_result_records(&self) -> Vec<ExtensionRecord> {
        let state = self.inner.state.lock();
        sorted_records(&state.store, &state.search_result)
    }

    /// Installed records ordered by label.
    pub fn installed_records(&self) -> Vec<ExtensionRecord> {
        let state = self.inner.state.lock();
        sorted_records(&state.store, &state.installed)
    }
}

fn sorted_records(store: &ExtensionStore, ids: &BTreeSet<ExtensionId>) -> Vec<ExtensionRecord> {
    let mut records: Vec<ExtensionRecord> = ids.iter().filter_map(|id| store.get(id)).cloned().collect();
    records.sort_by(|a, b| {
        a.label()
            .to_lowercase()
            .cmp(&b.label().to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

async fn listen_to_host(inner: Weak<Inner>, mut changes: broadcast::Receiver<()>) {
    loop {
        match changes.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return,
        }

        let Some(inner) = inner.upgrade() else {
            return;
        };
        ExtensionCatalog { inner }.reconcile_installed().await;
    }
}
