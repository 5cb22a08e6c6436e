//! Heading slugs with per-document deduplication.

use std::collections::HashMap;

/// Turns heading text into a URL fragment.
///
/// Lowercases, drops punctuation, and maps whitespace to `-`. Letters and
/// digits outside ASCII are kept.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == '-' {
            slug.extend(ch.to_lowercase());
        } else if ch.is_whitespace() {
            slug.push('-');
        }
    }
    slug
}

/// Running occurrence counter for slugs within a single document.
///
/// One counter is created per document and threaded through extraction, so
/// identical headings in different documents keep identical anchors.
#[derive(Debug, Default, Clone)]
pub struct SlugCounter {
    occurrences: HashMap<String, usize>,
}

impl SlugCounter {
    /// Creates an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a document-unique slug for `text`.
    ///
    /// The first occurrence gets the bare slug; later ones get `-1`, `-2`, ...
    /// skipping any suffixed form that is already taken.
    pub fn slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        let mut candidate = base.clone();
        if self.occurrences.contains_key(&base) {
            loop {
                let count = self.occurrences.entry(base.clone()).or_insert(0);
                *count += 1;
                candidate = format!("{base}-{count}");
                if !self.occurrences.contains_key(&candidate) {
                    break;
                }
            }
        }
        self.occurrences.insert(candidate.clone(), 0);
        candidate
    }
}
