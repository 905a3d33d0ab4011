use std::collections::HashMap;

use crate::model::extension::{ExtensionId, ExtensionPatch, ExtensionRecord};

/// Owns every extension record, at most one per id.
#[derive(Debug, Default)]
pub struct ExtensionStore {
    records: HashMap<ExtensionId, ExtensionRecord>,
}

impl ExtensionStore {
    pub fn get(&self, id: &ExtensionId) -> Option<&ExtensionRecord> {
        self.records.get(id)
    }

    /// Creates the record if absent, then merges `patch` onto it.
    pub fn upsert(&mut self, id: ExtensionId, patch: ExtensionPatch) -> &ExtensionRecord {
        let record = self
            .records
            .entry(id)
            .or_insert_with_key(|id| ExtensionRecord::new(id.clone()));
        record.apply(patch);
        record
    }

    pub fn ensure(&mut self, id: ExtensionId) -> &ExtensionRecord {
        self.upsert(id, ExtensionPatch::default())
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
