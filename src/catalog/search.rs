use std::collections::BTreeSet;

use crate::catalog::notify::Outcome;
use crate::catalog::query::EpochToken;
use crate::catalog::ExtensionCatalog;

impl ExtensionCatalog {
    /// Cancels the previous search cycle and runs a new one for `query`.
    pub(crate) fn start_search_cycle(&self, query: String) {
        let token = self.next_epoch();
        let this = self.clone();
        tokio::spawn(async move {
            this.inner
                .notifier
                .track(
                    "Searching extensions",
                    "search",
                    this.update_search_result(&query, &token),
                )
                .await
        });
    }

    fn next_epoch(&self) -> EpochToken {
        let token = EpochToken::new();
        let mut state = self.inner.state.lock();
        state.epoch.cancel();
        state.epoch = token.clone();
        token
    }

    async fn update_search_result(&self, query: &str, token: &EpochToken) -> Outcome<()> {
        let query = query.trim();
        let summaries = if query.is_empty() {
            Vec::new()
        } else {
            match self.inner.registry.search(query).await {
                Ok(summaries) => summaries,
                Err(err) => {
                    if !token.is_cancelled() {
                        tracing::warn!(query, "extension search failed: {err}");
                    }
                    return Outcome::Skipped(());
                }
            }
        };

        if token.is_cancelled() {
            return Outcome::Skipped(());
        }

        // The epoch only moves under this lock, so the check below holds for
        // the whole commit.
        let mut state = self.inner.state.lock();
        if token.is_cancelled() {
            return Outcome::Skipped(());
        }

        let mut search_result = BTreeSet::new();
        for summary in summaries {
            let id = match summary.id() {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!("skipping search hit: {err}");
                    continue;
                }
            };
            state.store.upsert(id.clone(), summary.to_patch());
            search_result.insert(id);
        }

        tracing::debug!(query, hits = search_result.len(), "search committed");
        state.search_result = search_result;
        state.search_query = query.to_string();
        Outcome::Committed(())
    }
}
