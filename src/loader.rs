//! Finished-document discovery and parsing.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::content::{self, ContentNode};
use crate::error::LoadError;
use crate::frontmatter::{self, Frontmatter};

/// File extensions treated as documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["md", "mdx"];

/// One finished page ready for extraction.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the docs root.
    pub path: PathBuf,
    /// Public URL without anchor.
    pub url: String,
    /// Page title (always non-blank).
    pub title: String,
    /// Normalized frontmatter.
    pub frontmatter: Frontmatter,
    /// Parsed body.
    pub tree: ContentNode,
}

impl Document {
    /// SDK this rendering is scoped to.
    pub fn active_sdk(&self) -> Option<&str> {
        self.frontmatter.active_sdk.as_deref()
    }

    /// SDKs the logical page is available for (`["all"]` when undeclared).
    pub fn available_sdks(&self) -> Vec<String> {
        self.frontmatter.available_sdks.to_vec()
    }

    /// Canonical URL template.
    pub fn canonical(&self) -> Option<&str> {
        self.frontmatter.canonical.as_deref()
    }

    /// Static ranking boost.
    pub fn page_rank(&self) -> i64 {
        self.frontmatter.page_rank
    }
}

/// Why a document was left out of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// File could not be read.
    Unreadable(String),
    /// Frontmatter missing its closing fence or not valid YAML.
    InvalidFrontmatter(String),
    /// Body could not be turned into a content tree.
    ContentParse(String),
    /// Page declares itself a redirect.
    Redirect,
    /// Page opts out with `search.exclude`.
    SearchExcluded,
    /// No usable title.
    MissingTitle,
}

impl SkipReason {
    /// Short stable label used for grouping in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unreadable(_) => "unreadable",
            Self::InvalidFrontmatter(_) => "invalid_frontmatter",
            Self::ContentParse(_) => "content_parse",
            Self::Redirect => "redirect",
            Self::SearchExcluded => "search_excluded",
            Self::MissingTitle => "missing_title",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(err) => write!(f, "unreadable: {err}"),
            Self::InvalidFrontmatter(err) => write!(f, "invalid frontmatter: {err}"),
            Self::ContentParse(err) => write!(f, "content parse failed: {err}"),
            Self::Redirect => write!(f, "redirect page"),
            Self::SearchExcluded => write!(f, "excluded from search"),
            Self::MissingTitle => write!(f, "missing title"),
        }
    }
}

/// A document that was discovered but not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    /// Path relative to the docs root.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Result of loading a docs root.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Loaded documents in discovery order.
    pub documents: Vec<Document>,
    /// Skipped documents in discovery order.
    pub skipped: Vec<SkippedDocument>,
}

/// Walks a directory of finished documents.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    root: PathBuf,
    base_url: String,
}

impl DocumentLoader {
    /// Builds a loader for `root`, publishing pages under `base_url`.
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    /// Docs root being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads every document under the root.
    ///
    /// Discovery order is the sorted directory walk. Parsing runs in parallel;
    /// per-document failures become [`SkippedDocument`]s and never abort the
    /// load.
    pub fn load(&self) -> Result<LoadOutcome, LoadError> {
        if !self.root.is_dir() {
            return Err(LoadError::InvalidRoot(self.root.clone()));
        }

        let mut outcome = LoadOutcome::default();
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let Some(path) = err.path().map(Path::to_path_buf) else {
                        return Err(LoadError::Walk(err));
                    };
                    let reason = SkipReason::Unreadable(err.to_string());
                    warn!(path = %path.display(), %reason, "skipping document");
                    outcome.skipped.push(SkippedDocument { path, reason });
                    continue;
                }
            };
            if entry.file_type().is_file() && is_document(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        debug!(count = paths.len(), root = %self.root.display(), "discovered documents");

        let results: Vec<Result<Document, SkippedDocument>> =
            paths.par_iter().map(|path| self.load_file(path)).collect();

        for result in results {
            match result {
                Ok(document) => outcome.documents.push(document),
                Err(skipped) => {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipping document");
                    outcome.skipped.push(skipped);
                }
            }
        }
        Ok(outcome)
    }

    fn load_file(&self, path: &Path) -> Result<Document, SkippedDocument> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path).to_path_buf();
        let skip = |reason| SkippedDocument {
            path: relative.clone(),
            reason,
        };
        let source = fs::read_to_string(path)
            .map_err(|err| skip(SkipReason::Unreadable(err.to_string())))?;
        let url = public_url(&self.base_url, &relative);
        parse_document(&relative, url, &source).map_err(skip)
    }
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext))
}

/// Parses one document's source into a [`Document`], or explains why it is skipped.
pub fn parse_document(path: &Path, url: String, source: &str) -> Result<Document, SkipReason> {
    let (yaml, body) = frontmatter::split(source)
        .map_err(|err| SkipReason::InvalidFrontmatter(err.to_string()))?;
    let frontmatter = frontmatter::parse(yaml.unwrap_or_default())
        .map_err(|err| SkipReason::InvalidFrontmatter(err.to_string()))?;

    if frontmatter.redirect {
        return Err(SkipReason::Redirect);
    }
    if frontmatter.search_exclude {
        return Err(SkipReason::SearchExcluded);
    }
    let Some(title) = frontmatter.title.clone() else {
        return Err(SkipReason::MissingTitle);
    };

    // Only the body is parsed; a BOM or blank line inside the frontmatter
    // would otherwise turn the closing fence into a setext heading.
    let tree = content::parse(body).map_err(|err| SkipReason::ContentParse(err.to_string()))?;

    Ok(Document {
        path: path.to_path_buf(),
        url,
        title,
        frontmatter,
        tree,
    })
}

/// Public URL for a document at `relative` under the docs root.
///
/// Extensions are dropped and a trailing `index` segment maps to its directory.
pub fn public_url(base_url: &str, relative: &Path) -> String {
    let mut segments: Vec<String> = relative
        .with_extension("")
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if segments.last().is_some_and(|last| last == "index") {
        segments.pop();
    }

    let base = base_url.trim_end_matches('/');
    if segments.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    format!("{}/{}", base, segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, relative: &str, contents: &str) {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn public_url_strips_extension_and_index() {
        assert_eq!(public_url("/docs", Path::new("guides/setup.mdx")), "/docs/guides/setup");
        assert_eq!(public_url("/docs/", Path::new("guides/index.mdx")), "/docs/guides");
        assert_eq!(public_url("/docs", Path::new("index.md")), "/docs");
        assert_eq!(public_url("", Path::new("index.md")), "/");
        assert_eq!(public_url("", Path::new("a/b.md")), "/a/b");
    }

    #[test]
    fn loads_documents_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.mdx", "---\ntitle: B\n---\nBody\n");
        write(&dir, "a/index.mdx", "---\ntitle: A\n---\nBody\n");
        write(&dir, "notes.txt", "ignored");

        let outcome = DocumentLoader::new(dir.path(), "/docs").load().unwrap();
        let urls: Vec<&str> = outcome.documents.iter().map(|doc| doc.url.as_str()).collect();
        assert_eq!(urls, vec!["/docs/a", "/docs/b"]);
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn exclusions_are_counted_not_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ok.mdx", "---\ntitle: Fine\n---\nBody\n");
        write(&dir, "redirect.mdx", "---\ntitle: Old\nredirectPage: true\n---\n");
        write(&dir, "hidden.mdx", "---\ntitle: Hidden\nsearch:\n  exclude: true\n---\n");
        write(&dir, "untitled.mdx", "---\ndescription: no title\n---\nBody\n");
        write(&dir, "broken.mdx", "---\ntitle: [oops\n---\nBody\n");
        write(&dir, "unterminated.mdx", "---\ntitle: Never closed\n");

        let outcome = DocumentLoader::new(dir.path(), "/docs").load().unwrap();
        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[0].title, "Fine");

        let mut labels: Vec<&str> = outcome.skipped.iter().map(|s| s.reason.label()).collect();
        labels.sort_unstable();
        assert_eq!(
            labels,
            vec![
                "invalid_frontmatter",
                "invalid_frontmatter",
                "missing_title",
                "redirect",
                "search_excluded",
            ]
        );
    }

    #[test]
    fn missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = DocumentLoader::new(dir.path().join("nope"), "/docs")
            .load()
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidRoot(_)));
    }

    #[test]
    fn parse_document_exposes_frontmatter() {
        let doc = parse_document(
            Path::new("setup.mdx"),
            "/docs/setup".to_string(),
            "---\ntitle: Setup\navailableSdks: react,vue\npageRank: 2\ncanonical: /docs/:sdk:/setup\n---\n\nBody\n",
        )
        .unwrap();
        assert_eq!(doc.title, "Setup");
        assert_eq!(doc.available_sdks(), vec!["react", "vue"]);
        assert_eq!(doc.page_rank(), 2);
        assert_eq!(doc.canonical(), Some("/docs/:sdk:/setup"));
        assert_eq!(doc.active_sdk(), None);
    }

    fn body_units(source: &str) -> Vec<(String, Option<String>, String)> {
        let doc = parse_document(Path::new("setup.mdx"), "/docs/setup".to_string(), source).unwrap();
        crate::extract(&doc.title, &doc.tree)
            .into_iter()
            .map(|unit| (unit.kind.as_type(), unit.content, unit.anchor))
            .collect()
    }

    #[test]
    fn frontmatter_never_leaks_into_body() {
        let expected = vec![
            ("lvl1".to_string(), None, "main".to_string()),
            ("content".to_string(), Some("Body.".to_string()), "main".to_string()),
        ];
        assert_eq!(body_units("\u{feff}---\ntitle: Setup\n---\n\nBody.\n"), expected);
        assert_eq!(body_units("---\n\ntitle: Setup\n---\n\nBody.\n"), expected);
        assert_eq!(
            body_units("\u{feff}---\r\ntitle: Setup\r\n---\r\n\r\nBody.\r\n"),
            expected
        );
    }
}
