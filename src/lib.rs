#![warn(missing_docs)]
//! Core library entry points for the docsearch indexing pipeline.

pub mod batch;
pub mod config;
pub mod content;
pub mod error;
pub mod extractor;
pub mod frontmatter;
pub mod index;
pub mod loader;
pub mod mdx;
pub mod pipeline;
pub mod record;
pub mod slug;
pub mod sync;

pub use batch::{resolve_branch, BatchStamp};
pub use config::{IndexCli, Mode, RemoteConfig, RunConfig};
pub use content::{ContentNode, NodeKind};
pub use error::{
    ConfigError, ContentError, FrontmatterError, IndexError, LoadError, PipelineError, SyncError,
};
pub use extractor::{extract, ContentUnit, Hierarchy, UnitKind, Visit};
pub use frontmatter::{AvailableSdks, Frontmatter};
pub use index::{AlgoliaIndex, BrowsePage, IndexService, IndexSettings, MemoryIndex, StaleFilter};
pub use loader::{Document, DocumentLoader, LoadOutcome, SkipReason, SkippedDocument};
pub use pipeline::{run as run_pipeline, RunSummary};
pub use record::{synthesize, SearchRecord, Weight};
pub use slug::SlugCounter;
pub use sync::{IndexSynchronizer, SyncOptions, SyncPhase, SyncReport};
