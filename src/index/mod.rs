//! Remote search index seam.
//!
//! [`IndexService`] is the logical contract the synchronizer drives: upsert by
//! `objectID`, metadata-only paginated browse by filter, and batched delete.
//! [`AlgoliaIndex`] speaks the hosted REST API; [`MemoryIndex`] keeps records
//! in process for dry runs and tests.

pub mod algolia;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::IndexError;
use crate::record::SearchRecord;

pub use algolia::AlgoliaIndex;
pub use memory::MemoryIndex;

/// Most ids the service accepts in one delete call.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Conjunctive filter selecting records of `branch` written by any batch other
/// than `current_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleFilter {
    /// Branch whose records are inspected.
    pub branch: String,
    /// Batch that must be excluded.
    pub current_batch: String,
}

impl StaleFilter {
    /// Builds a filter for `branch`, excluding `current_batch`.
    pub fn new(branch: impl Into<String>, current_batch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            current_batch: current_batch.into(),
        }
    }

    /// Facet filter expression: `branch:"B" AND NOT record_batch:"X"`.
    pub fn expression(&self) -> String {
        format!(
            "branch:{} AND NOT record_batch:{}",
            quote_facet(&self.branch),
            quote_facet(&self.current_batch)
        )
    }

    /// Evaluates the filter against a record locally.
    pub fn matches(&self, record: &SearchRecord) -> bool {
        record.branch.as_deref() == Some(self.branch.as_str())
            && record.record_batch.as_deref() != Some(self.current_batch.as_str())
    }
}

fn quote_facet(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One page of a filtered browse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowsePage {
    /// Matching record ids.
    pub object_ids: Vec<String>,
    /// Cursor for the next page; `None` when exhausted.
    pub cursor: Option<String>,
}

/// Index settings that encode ranking and SDK-variant deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    /// Enables result collapsing on `attribute_for_distinct`.
    pub distinct: bool,
    /// Attribute hits are grouped by.
    pub attribute_for_distinct: String,
    /// Facet attributes (filter-only where wrapped).
    pub attributes_for_faceting: Vec<String>,
    /// Searchable attributes in priority order.
    pub searchable_attributes: Vec<String>,
    /// Tie-break ranking after textual relevance.
    pub custom_ranking: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        let mut searchable: Vec<String> = (0..=6)
            .map(|level| format!("unordered(hierarchy.lvl{level})"))
            .collect();
        searchable.push("content".to_string());
        Self {
            distinct: true,
            attribute_for_distinct: "distinct_group".to_string(),
            attributes_for_faceting: vec![
                "filterOnly(branch)".to_string(),
                "filterOnly(record_batch)".to_string(),
                "sdk".to_string(),
                "availableSDKs".to_string(),
            ],
            searchable_attributes: searchable,
            custom_ranking: vec![
                "desc(weight.pageRank)".to_string(),
                "desc(weight.level)".to_string(),
                "asc(weight.position)".to_string(),
            ],
        }
    }
}

/// Operations the synchronizer needs from a search index.
#[async_trait]
pub trait IndexService: Send + Sync {
    /// Creates or replaces `records` by `objectID`, returning once the write
    /// is acknowledged.
    async fn upsert(&self, records: &[SearchRecord]) -> Result<(), IndexError>;

    /// Returns one page of ids matching `filter`, starting at `cursor`.
    async fn browse(
        &self,
        filter: &StaleFilter,
        cursor: Option<&str>,
    ) -> Result<BrowsePage, IndexError>;

    /// Deletes up to [`MAX_DELETE_BATCH`] ids.
    async fn delete(&self, object_ids: &[String]) -> Result<(), IndexError>;

    /// Applies index settings.
    async fn configure(&self, settings: &IndexSettings) -> Result<(), IndexError>;
}
