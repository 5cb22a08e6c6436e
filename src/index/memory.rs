//! In-process index used for dry runs and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BrowsePage, IndexService, IndexSettings, StaleFilter, MAX_DELETE_BATCH};
use crate::error::IndexError;
use crate::record::SearchRecord;

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Records keyed by `objectID`, browsed in id order.
#[derive(Debug)]
pub struct MemoryIndex {
    records: Mutex<BTreeMap<String, SearchRecord>>,
    settings: Mutex<Option<IndexSettings>>,
    page_size: usize,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Empty index with the service's default browse page size.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Empty index that returns at most `page_size` ids per browse page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            settings: Mutex::new(None),
            page_size: page_size.max(1),
        }
    }

    /// Inserts records directly, bypassing the upsert path.
    pub async fn seed(&self, records: impl IntoIterator<Item = SearchRecord>) {
        let mut guard = self.records.lock().await;
        for record in records {
            guard.insert(record.object_id.clone(), record);
        }
    }

    /// Snapshot of every stored record in id order.
    pub async fn records(&self) -> Vec<SearchRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the index holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Settings applied by the last `configure` call.
    pub async fn settings(&self) -> Option<IndexSettings> {
        self.settings.lock().await.clone()
    }
}

#[async_trait]
impl IndexService for MemoryIndex {
    async fn upsert(&self, records: &[SearchRecord]) -> Result<(), IndexError> {
        let mut guard = self.records.lock().await;
        for record in records {
            guard.insert(record.object_id.clone(), record.clone());
        }
        Ok(())
    }

    async fn browse(
        &self,
        filter: &StaleFilter,
        cursor: Option<&str>,
    ) -> Result<BrowsePage, IndexError> {
        let offset = match cursor {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| IndexError::Decode(format!("invalid browse cursor `{raw}`")))?,
            None => 0,
        };
        let guard = self.records.lock().await;
        let matching: Vec<&String> = guard
            .values()
            .filter(|record| filter.matches(record))
            .map(|record| &record.object_id)
            .collect();
        let end = (offset + self.page_size).min(matching.len());
        let object_ids = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|id| (*id).clone())
            .collect();
        let cursor = (end < matching.len()).then(|| end.to_string());
        Ok(BrowsePage { object_ids, cursor })
    }

    async fn delete(&self, object_ids: &[String]) -> Result<(), IndexError> {
        if object_ids.len() > MAX_DELETE_BATCH {
            return Err(IndexError::Limit(format!(
                "delete of {} ids exceeds the {} id limit",
                object_ids.len(),
                MAX_DELETE_BATCH
            )));
        }
        let mut guard = self.records.lock().await;
        for id in object_ids {
            guard.remove(id);
        }
        Ok(())
    }

    async fn configure(&self, settings: &IndexSettings) -> Result<(), IndexError> {
        *self.settings.lock().await = Some(settings.clone());
        Ok(())
    }
}
