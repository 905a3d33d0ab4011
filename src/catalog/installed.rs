use std::collections::BTreeSet;

use futures::future::join_all;

use crate::catalog::ExtensionCatalog;
use crate::catalog::notify::Outcome;
use crate::model::extension::{ExtensionId, ExtensionPatch};

impl ExtensionCatalog {
    /// Replaces the installed set with what the host reports right now and
    /// schedules a registry refresh for every added, kept or removed id.
    ///
    /// The refreshes run in the background; the installed set is swapped
    /// without waiting for them.
    pub async fn reconcile_installed(&self) {
        self.inner
            .notifier
            .track("Loading installed extensions", "installed", async {
                let to_refresh = self.swap_installed();
                self.spawn_refreshes(to_refresh);
                Outcome::Committed(())
            })
            .await
    }

    fn swap_installed(&self) -> Vec<ExtensionId> {
        let mut current = BTreeSet::new();
        let mut versions = Vec::new();
        for plugin in self.inner.host.plugins() {
            if plugin.engine != self.inner.extension_engine {
                continue;
            }
            match ExtensionId::parse(&plugin.id) {
                Ok(id) => {
                    if current.insert(id.clone()) {
                        versions.push((id, plugin.version));
                    }
                }
                Err(err) => tracing::warn!("ignoring host plugin: {err}"),
            }
        }

        let mut state = self.inner.state.lock();
        let removed: Vec<ExtensionId> = state.installed.difference(&current).cloned().collect();

        for (id, version) in versions {
            state.store.upsert(id, ExtensionPatch::installed(version));
        }
        for id in &removed {
            state.store.upsert(id.clone(), ExtensionPatch::uninstalled());
        }

        tracing::debug!(
            installed = current.len(),
            removed = removed.len(),
            records = state.store.len(),
            "installed set reconciled"
        );

        let to_refresh = current.iter().cloned().chain(removed).collect();
        state.installed = current;
        to_refresh
    }

    fn spawn_refreshes(&self, ids: Vec<ExtensionId>) {
        if ids.is_empty() {
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.inner
                .notifier
                .track("Refreshing installed extensions", "installed", async {
                    let refreshed = join_all(ids.iter().map(|id| this.refresh_bounded(id))).await;
                    if refreshed.iter().any(Option::is_some) {
                        Outcome::Committed(())
                    } else {
                        Outcome::Skipped(())
                    }
                })
                .await
        });
    }

    async fn refresh_bounded(&self, id: &ExtensionId) -> Option<()> {
        let _permit = match &self.inner.refresh_limit {
            Some(limit) => Some(limit.clone().acquire_owned().await.ok()?),
            None => None,
        };
        self.refresh_record(id).await.map(|_| ())
    }
}
