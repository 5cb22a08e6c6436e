//! Error types surfaced by each pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

use crate::sync::SyncPhase;

/// Failures while splitting or decoding a document's frontmatter block.
#[derive(Debug, Error)]
pub enum FrontmatterError {
    /// An opening `---` fence was found without a matching closing fence.
    #[error("frontmatter block is not terminated")]
    Unterminated,

    /// The block is not valid YAML or does not decode into the expected shape.
    #[error("invalid frontmatter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A field decoded but carries a value the loader cannot interpret.
    #[error("frontmatter field `{field}` is malformed: {detail}")]
    Field {
        /// Offending key.
        field: &'static str,
        /// Human readable description.
        detail: String,
    },
}

/// Failures while assembling the content tree from the Markdown event stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    /// An end event arrived with no open container.
    #[error("unexpected end of `{0}` with no open container")]
    UnexpectedEnd(String),

    /// The stream finished while containers were still open.
    #[error("{0} container(s) left open at end of document")]
    Unclosed(usize),
}

/// Fatal loader failures. Per-document problems are reported as skips instead.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The configured docs root does not exist or is not a directory.
    #[error("docs root {0:?} is not a readable directory")]
    InvalidRoot(PathBuf),

    /// Directory traversal failed outside of any single document.
    #[error("failed to walk docs root: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Configuration problems detected before any processing starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A credential or setting required for remote mode is missing.
    #[error("missing required setting `{0}` (pass --local to skip the remote index)")]
    Missing(&'static str),

    /// A numeric knob is outside its accepted range.
    #[error("`{name}` must be at least {min}")]
    OutOfRange {
        /// Flag name.
        name: &'static str,
        /// Smallest accepted value.
        min: u64,
    },

    /// The endpoint override is not an http(s) URL.
    #[error("index endpoint must be an http(s) URL, got `{0}`")]
    InvalidEndpoint(String),
}

/// Errors raised by an [`IndexService`](crate::index::IndexService) implementation.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("index request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status after exhausting retries.
    #[error("index service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        body: String,
    },

    /// The response body did not decode into the expected shape.
    #[error("malformed index response: {0}")]
    Decode(String),

    /// A write task never reached the published state.
    #[error("task {task_id} not published after {attempts} polls")]
    TaskTimeout {
        /// Service task identifier.
        task_id: u64,
        /// Number of polls performed.
        attempts: usize,
    },

    /// A request exceeded a limit the service enforces.
    #[error("{0}")]
    Limit(String),

    /// Failure injected or reported by a non-HTTP implementation.
    #[error("{0}")]
    Other(String),
}

/// Errors that end a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The index service failed while the synchronizer was in `phase`.
    #[error("index sync failed during {phase}: {source}")]
    Index {
        /// Phase active when the failure happened.
        phase: SyncPhase,
        /// Underlying service error.
        #[source]
        source: IndexError,
    },

    /// A record could not be serialized for size accounting.
    #[error("failed to serialize record {object_id}: {source}")]
    Serialize {
        /// Record identifier.
        object_id: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A transition was requested that the phase machine does not allow.
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current phase.
        from: SyncPhase,
        /// Requested phase.
        to: SyncPhase,
    },
}

/// Fatal failures of an end-to-end indexing run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The docs root could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The local artifact could not be written.
    #[error("failed to write {path:?}: {source}")]
    Artifact {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialized into the local artifact.
    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The index client could not be built or configured.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Synchronization aborted.
    #[error(transparent)]
    Sync(#[from] SyncError),
}
