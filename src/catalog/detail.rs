use crate::catalog::notify::Outcome;
use crate::catalog::{CatalogError, ExtensionCatalog};
use crate::model::extension::{ExtensionId, ExtensionPatch, ExtensionRecord};

impl ExtensionCatalog {
    /// Re-fetches one extension from the registry.
    ///
    /// Returns `None` when the registry cannot resolve it. A not-found answer
    /// for an installed extension keeps the stored record, since the registry
    /// may simply lag behind.
    pub async fn refresh(&self, id: &ExtensionId) -> Option<ExtensionRecord> {
        self.inner
            .notifier
            .track("Refreshing extension", "refresh", async {
                match self.refresh_record(id).await {
                    Some(record) => Outcome::Committed(Some(record)),
                    None => Outcome::Skipped(None),
                }
            })
            .await
    }

    /// Refreshes one extension and renders its readme for a detail view.
    pub async fn resolve(&self, id: &ExtensionId) -> Result<ExtensionRecord, CatalogError> {
        self.inner
            .notifier
            .track("Resolving extension", "resolve", async {
                let Some(record) = self.refresh_record(id).await else {
                    return Outcome::Skipped(Err(CatalogError::CannotResolve { id: id.clone() }));
                };
                Outcome::Committed(Ok(self.resolve_readme(record).await))
            })
            .await
    }

    pub(crate) async fn refresh_record(&self, id: &ExtensionId) -> Option<ExtensionRecord> {
        match self.inner.registry.get_extension(id).await {
            Ok(detail) => {
                let mut state = self.inner.state.lock();
                Some(state.store.upsert(id.clone(), detail.to_patch()).clone())
            }
            Err(err) if err.is_not_found() => {
                let state = self.inner.state.lock();
                match state.store.get(id) {
                    Some(record) if record.installed => Some(record.clone()),
                    _ => {
                        tracing::debug!(%id, "extension not found in registry");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%id, "failed to refresh extension: {err}");
                None
            }
        }
    }

    async fn resolve_readme(&self, record: ExtensionRecord) -> ExtensionRecord {
        let Some(url) = record.readme_url.as_deref() else {
            return record;
        };

        match self.inner.registry.fetch_text(url).await {
            Ok(markdown) => {
                let html = self.inner.renderer.render(&markdown);
                let mut state = self.inner.state.lock();
                state
                    .store
                    .upsert(record.id.clone(), ExtensionPatch::readme(html))
                    .clone()
            }
            Err(err) if err.is_not_found() => record,
            Err(err) => {
                tracing::warn!(id = %record.id, "failed to fetch readme: {err}");
                record
            }
        }
    }
}
