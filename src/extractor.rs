//! Content extraction: walks a document tree and emits indexable units.
//!
//! Traversal is an explicit recursive descent. Each node is visited once and
//! answers with a [`Visit`] telling the walker whether to enter its children.
//! The heading ladder ([`Hierarchy`]) and the current anchor are sequential
//! per-document state; the slug counter is passed in by the caller so a
//! document never shares it with another.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::content::{ContentNode, NodeKind};
use crate::slug::SlugCounter;

/// Anchor used for page-level hits and content before the first heading.
pub const MAIN_ANCHOR: &str = "main";
/// Fixed label stored in `hierarchy.lvl0`.
pub const TOP_LEVEL_LABEL: &str = "Documentation";
/// Extracted text must be strictly shorter than this many characters.
pub const MAX_CONTENT_CHARS: usize = 5000;
/// Deepest heading level tracked by the hierarchy.
pub const MAX_DEPTH: u8 = 6;

static ID_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s*\{\{\s*id\s*:\s*["']([^"']+)["']\s*\}\}\s*$"#)
        .expect("id annotation pattern")
});

/// Section ladder: a fixed top-level label plus six nullable heading slots.
///
/// Setting level `d` clears every level below it and leaves shallower levels
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    top: Option<String>,
    levels: [Option<String>; MAX_DEPTH as usize],
}

impl Hierarchy {
    /// Hierarchy for a page: top-level label plus the title at level 1.
    pub fn for_page(title: &str) -> Self {
        let mut hierarchy = Self {
            top: Some(TOP_LEVEL_LABEL.to_string()),
            ..Self::default()
        };
        if !title.trim().is_empty() {
            hierarchy.set(1, title.trim());
        }
        hierarchy
    }

    /// Sets level `depth` (1-6) and clears all deeper levels.
    pub fn set(&mut self, depth: u8, text: &str) {
        let Some(slot) = slot_index(depth) else {
            return;
        };
        self.levels[slot] = Some(text.to_string());
        for deeper in &mut self.levels[slot + 1..] {
            *deeper = None;
        }
    }

    /// Clears level `depth` (1-6) and all deeper levels.
    pub fn clear(&mut self, depth: u8) {
        let Some(slot) = slot_index(depth) else {
            return;
        };
        for level in &mut self.levels[slot..] {
            *level = None;
        }
    }

    /// Value at level `depth` (1-6).
    pub fn level(&self, depth: u8) -> Option<&str> {
        slot_index(depth).and_then(|slot| self.levels[slot].as_deref())
    }

    /// Top-level (`lvl0`) label.
    pub fn top(&self) -> Option<&str> {
        self.top.as_deref()
    }
}

fn slot_index(depth: u8) -> Option<usize> {
    (1..=MAX_DEPTH)
        .contains(&depth)
        .then(|| usize::from(depth) - 1)
}

impl Serialize for Hierarchy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Hierarchy", 7)?;
        state.serialize_field("lvl0", &self.top)?;
        state.serialize_field("lvl1", &self.levels[0])?;
        state.serialize_field("lvl2", &self.levels[1])?;
        state.serialize_field("lvl3", &self.levels[2])?;
        state.serialize_field("lvl4", &self.levels[3])?;
        state.serialize_field("lvl5", &self.levels[4])?;
        state.serialize_field("lvl6", &self.levels[5])?;
        state.end()
    }
}

/// Unit classification; maps one-to-one onto record `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Heading boundary at depth 1-6.
    Heading(u8),
    /// Paragraph or flat list-item text.
    Content,
}

impl UnitKind {
    /// Record `type` string (`lvl1`..`lvl6` or `content`).
    pub fn as_type(&self) -> String {
        match self {
            Self::Heading(depth) => format!("lvl{depth}"),
            Self::Content => "content".to_string(),
        }
    }
}

/// One indexable unit, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUnit {
    /// Heading marker or content.
    pub kind: UnitKind,
    /// Text payload; `None` for heading markers.
    pub content: Option<String>,
    /// Fragment the unit links to.
    pub anchor: String,
    /// Hierarchy snapshot at emission time.
    pub hierarchy: Hierarchy,
}

/// Whether the walker should descend into a node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Enter children.
    Continue,
    /// Skip the node's entire subtree.
    SkipSubtree,
}

/// Extracts units for one document with a fresh slug counter.
pub fn extract(title: &str, tree: &ContentNode) -> Vec<ContentUnit> {
    let mut slugs = SlugCounter::new();
    extract_with(title, tree, &mut slugs)
}

/// Extracts units for one document using the caller's slug counter.
///
/// Emits the page marker first (anchored at [`MAIN_ANCHOR`]) when `title` is
/// non-blank, then every heading and accepted text block in document order.
pub fn extract_with(title: &str, tree: &ContentNode, slugs: &mut SlugCounter) -> Vec<ContentUnit> {
    let mut collector = UnitCollector::new(title);
    collector.walk(tree, slugs);
    collector.finish()
}

struct UnitCollector {
    title: String,
    hierarchy: Hierarchy,
    current_anchor: String,
    units: Vec<ContentUnit>,
}

impl UnitCollector {
    fn new(title: &str) -> Self {
        let title = collapse_whitespace(title);
        let hierarchy = Hierarchy::for_page(&title);
        let mut collector = Self {
            title,
            hierarchy,
            current_anchor: MAIN_ANCHOR.to_string(),
            units: Vec::new(),
        };
        if !collector.title.is_empty() {
            collector.push_unit(UnitKind::Heading(1), None);
        }
        collector
    }

    fn walk(&mut self, node: &ContentNode, slugs: &mut SlugCounter) {
        if self.visit(node, slugs) == Visit::SkipSubtree {
            return;
        }
        for child in &node.children {
            self.walk(child, slugs);
        }
    }

    fn visit(&mut self, node: &ContentNode, slugs: &mut SlugCounter) -> Visit {
        match &node.kind {
            NodeKind::Table | NodeKind::CodeBlock | NodeKind::Yaml | NodeKind::Expression(_) => {
                Visit::SkipSubtree
            }
            NodeKind::Heading { depth, id } => {
                self.record_heading(node, *depth, id.as_deref(), slugs);
                Visit::SkipSubtree
            }
            NodeKind::Paragraph => {
                self.record_text(&node.plain_text());
                Visit::SkipSubtree
            }
            // Nested items are visited on their own; the item's lead
            // paragraph is picked up by the paragraph rule.
            NodeKind::ListItem if node.has_nested_list() => Visit::Continue,
            NodeKind::ListItem => {
                self.record_text(&node.plain_text());
                Visit::SkipSubtree
            }
            _ => Visit::Continue,
        }
    }

    fn record_heading(
        &mut self,
        node: &ContentNode,
        depth: u8,
        attribute_id: Option<&str>,
        slugs: &mut SlugCounter,
    ) {
        let (text, annotated_id) = split_id_annotation(&collapse_whitespace(&node.plain_text()));
        let explicit_id = annotated_id.or_else(|| {
            attribute_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        });
        if text.is_empty() && explicit_id.is_none() {
            return;
        }

        if depth == 1 && text == self.title {
            self.hierarchy.set(1, &text);
            self.current_anchor = MAIN_ANCHOR.to_string();
            return;
        }

        let anchor = match explicit_id {
            Some(id) => id,
            None => slugs.slug(&text),
        };
        if text.is_empty() {
            self.hierarchy.clear(depth);
        } else {
            self.hierarchy.set(depth, &text);
        }
        self.current_anchor = anchor;
        self.push_unit(UnitKind::Heading(depth), None);
    }

    fn record_text(&mut self, raw: &str) {
        let text = collapse_whitespace(raw);
        if is_indexable(&text) {
            self.push_unit(UnitKind::Content, Some(text));
        }
    }

    fn push_unit(&mut self, kind: UnitKind, content: Option<String>) {
        self.units.push(ContentUnit {
            kind,
            content,
            anchor: self.current_anchor.clone(),
            hierarchy: self.hierarchy.clone(),
        });
    }

    fn finish(self) -> Vec<ContentUnit> {
        self.units
    }
}

/// Length/emptiness/table-remnant guard shared by paragraphs and list items.
pub fn is_indexable(text: &str) -> bool {
    !text.is_empty() && !text.starts_with('|') && text.chars().count() < MAX_CONTENT_CHARS
}

/// Strips a trailing `{{ id: '...' }}` annotation, returning the id.
fn split_id_annotation(text: &str) -> (String, Option<String>) {
    match ID_ANNOTATION.captures(text) {
        Some(captures) => {
            let id = captures.get(1).map(|m| m.as_str().trim().to_string());
            let start = captures.get(0).map_or(text.len(), |m| m.start());
            (text[..start].trim().to_string(), id.filter(|id| !id.is_empty()))
        }
        None => (text.to_string(), None),
    }
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}
