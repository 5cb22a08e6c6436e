//! Search records: the persisted shape consumed by the search UI.

use serde::Serialize;

use crate::batch::BatchStamp;
use crate::extractor::{ContentUnit, Hierarchy, UnitKind};
use crate::loader::Document;

/// Ranking weights, compared in field order by the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Weight {
    /// Static page boost from frontmatter.
    #[serde(rename = "pageRank")]
    pub page_rank: i64,
    /// Heading-level weight from [`level_weight`].
    pub level: u32,
    /// Emission order within the document.
    pub position: u32,
}

/// Weight for a unit kind: level 1 = 90 down to level 6 = 40; content = 0.
pub fn level_weight(kind: UnitKind) -> u32 {
    match kind {
        UnitKind::Heading(1) => 90,
        UnitKind::Heading(2) => 80,
        UnitKind::Heading(3) => 70,
        UnitKind::Heading(4) => 60,
        UnitKind::Heading(5) => 50,
        UnitKind::Heading(6) => 40,
        UnitKind::Heading(_) | UnitKind::Content => 0,
    }
}

/// One independently addressable search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRecord {
    /// Identifier derived from the URL with anchor plus the record's position.
    #[serde(rename = "objectID")]
    pub object_id: String,
    /// URL including `#anchor`.
    pub url: String,
    /// Page URL.
    pub url_without_anchor: String,
    /// Fragment identifier.
    pub anchor: String,
    /// Text payload; `null` for heading markers.
    pub content: Option<String>,
    /// `lvl1`..`lvl6` or `content`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Hierarchy snapshot.
    pub hierarchy: Hierarchy,
    /// Ranking weights.
    pub weight: Weight,
    /// Active SDK as a zero- or one-element list.
    pub sdk: Vec<String>,
    /// SDKs the logical page is available for.
    #[serde(rename = "availableSDKs")]
    pub available_sdks: Vec<String>,
    /// Canonical URL template.
    pub canonical: Option<String>,
    /// Key the index collapses SDK-variant duplicates by.
    pub distinct_group: String,
    /// Branch the record was synced for; absent in local artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Batch that wrote the record; absent in local artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_batch: Option<String>,
}

impl SearchRecord {
    /// Stamps the record with synchronization metadata.
    pub fn stamp(&mut self, stamp: &BatchStamp) {
        self.branch = Some(stamp.branch.clone());
        self.record_batch = Some(stamp.batch_id.clone());
    }

    /// Drops synchronization metadata, as written to local artifacts.
    pub fn unstamped(mut self) -> Self {
        self.branch = None;
        self.record_batch = None;
        self
    }
}

/// Builds records for one document from its units.
///
/// Positions follow emission order across the whole document, starting at 0.
pub fn synthesize(document: &Document, units: Vec<ContentUnit>) -> Vec<SearchRecord> {
    let sdk: Vec<String> = document.active_sdk().map(str::to_string).into_iter().collect();
    let available_sdks = document.available_sdks();
    let canonical = document.canonical().map(str::to_string);
    let page_rank = document.page_rank();

    units
        .into_iter()
        .enumerate()
        .map(|(position, unit)| {
            let url = format!("{}#{}", document.url, unit.anchor);
            let group_base = canonical.as_deref().unwrap_or(&document.url);
            let position = u32::try_from(position).unwrap_or(u32::MAX);
            SearchRecord {
                object_id: format!("{url}-{position}"),
                distinct_group: format!("{group_base}#{}", unit.anchor),
                url,
                url_without_anchor: document.url.clone(),
                anchor: unit.anchor,
                content: unit.content,
                kind: unit.kind.as_type(),
                hierarchy: unit.hierarchy,
                weight: Weight {
                    page_rank,
                    level: level_weight(unit.kind),
                    position,
                },
                sdk: sdk.clone(),
                available_sdks: available_sdks.clone(),
                canonical: canonical.clone(),
                branch: None,
                record_batch: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor;
    use crate::loader::parse_document;
    use std::collections::HashSet;
    use std::path::Path;

    fn records(source: &str) -> Vec<SearchRecord> {
        let doc = parse_document(Path::new("setup.mdx"), "/docs/setup".to_string(), source).unwrap();
        let units = extractor::extract(&doc.title, &doc.tree);
        synthesize(&doc, units)
    }

    #[test]
    fn weight_table() {
        assert_eq!(level_weight(UnitKind::Heading(1)), 90);
        assert_eq!(level_weight(UnitKind::Heading(3)), 70);
        assert_eq!(level_weight(UnitKind::Heading(6)), 40);
        assert_eq!(level_weight(UnitKind::Heading(9)), 0);
        assert_eq!(level_weight(UnitKind::Content), 0);
    }

    #[test]
    fn positions_are_contiguous_and_ids_unique() {
        let records = records(
            "---\ntitle: Setup\n---\n\nIntro.\n\n## One\n\nA.\n\n## One\n\nB.\n\n### Two\n\n- x\n- y\n",
        );
        let positions: Vec<u32> = records.iter().map(|r| r.weight.position).collect();
        assert_eq!(positions, (0..records.len() as u32).collect::<Vec<_>>());

        let ids: HashSet<&str> = records.iter().map(|r| r.object_id.as_str()).collect();
        assert_eq!(ids.len(), records.len());
    }

    #[test]
    fn metadata_is_copied_from_document() {
        let records = records(
            "---\ntitle: Setup\nactiveSdk: react\navailableSdks: react,vue\npageRank: 5\ncanonical: /docs/:sdk:/setup\n---\n\n## Verify\n",
        );
        let heading = &records[1];
        assert_eq!(heading.sdk, vec!["react"]);
        assert_eq!(heading.available_sdks, vec!["react", "vue"]);
        assert_eq!(heading.weight.page_rank, 5);
        assert_eq!(heading.weight.level, 80);
        assert_eq!(heading.canonical.as_deref(), Some("/docs/:sdk:/setup"));
        assert_eq!(heading.distinct_group, "/docs/:sdk:/setup#verify");
        assert_eq!(heading.url, "/docs/setup#verify");
        assert_eq!(heading.url_without_anchor, "/docs/setup");
        assert_eq!(heading.object_id, "/docs/setup#verify-1");
    }

    #[test]
    fn distinct_group_falls_back_to_url() {
        let records = records("---\ntitle: Setup\n---\n\nBody.\n");
        assert_eq!(records[0].distinct_group, "/docs/setup#main");
        assert!(records[0].sdk.is_empty());
        assert_eq!(records[0].available_sdks, vec!["all"]);
    }

    #[test]
    fn local_json_shape_omits_sync_fields() {
        let record = records("---\ntitle: Setup\n---\n\nBody.\n").remove(1);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["objectID"], "/docs/setup#main-1");
        assert_eq!(value["type"], "content");
        assert_eq!(value["content"], "Body.");
        assert_eq!(value["weight"]["pageRank"], 0);
        assert_eq!(value["weight"]["level"], 0);
        assert_eq!(value["weight"]["position"], 1);
        assert_eq!(value["hierarchy"]["lvl0"], "Documentation");
        assert_eq!(value["hierarchy"]["lvl1"], "Setup");
        assert!(value["canonical"].is_null());
        assert!(value.get("availableSDKs").is_some());
        assert!(value.get("branch").is_none());
        assert!(value.get("record_batch").is_none());
    }

    #[test]
    fn stamping_adds_sync_fields() {
        let mut record = records("---\ntitle: Setup\n---\n").remove(0);
        record.stamp(&BatchStamp::new("batch-1", "main"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["branch"], "main");
        assert_eq!(value["record_batch"], "batch-1");
        assert!(record.unstamped().branch.is_none());
    }
}
