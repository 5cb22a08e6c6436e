//! Run configuration for the indexing binaries.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::ConfigError;
use crate::sync::{SyncOptions, DEFAULT_CONCURRENCY};

/// Command-line interface for `docsearch-index`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "docsearch-index",
    about = "Build search records from finished docs and sync them to the search index"
)]
pub struct IndexCli {
    /// Root directory of finished documents
    #[arg(long, env = "DOCSEARCH_DOCS_DIR", default_value = "dist")]
    pub docs_dir: PathBuf,

    /// Public URL prefix for every document
    #[arg(long, env = "DOCSEARCH_BASE_URL", default_value = "/docs")]
    pub base_url: String,

    /// Local JSON artifact path (used with --local)
    #[arg(
        long,
        env = "DOCSEARCH_OUTPUT",
        default_value = "dist/search-index.json"
    )]
    pub output: PathBuf,

    /// Write records to --output instead of the remote index
    #[arg(long, default_value_t = false, conflicts_with = "dry_run")]
    pub local: bool,

    /// Search service application id
    #[arg(long, env = "ALGOLIA_APP_ID")]
    pub app_id: Option<String>,

    /// Admin API key with write and browse access
    #[arg(long, env = "ALGOLIA_ADMIN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Target index name
    #[arg(long, env = "ALGOLIA_INDEX_NAME")]
    pub index_name: Option<String>,

    /// Override of the search service base URL
    #[arg(long, env = "DOCSEARCH_INDEX_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Branch the records belong to (defaults to CI env, then git)
    #[arg(long, env = "DOCSEARCH_BRANCH")]
    pub branch: Option<String>,

    /// Upsert chunks in flight at once
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Seconds to wait for each index request
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per request for rate limits or transient errors
    #[arg(long, default_value_t = 5)]
    pub max_retries: usize,

    /// Run the sync protocol against an in-memory index
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Push ranking and dedup settings before syncing
    #[arg(long, default_value_t = false)]
    pub configure_index: bool,
}

impl IndexCli {
    /// Validates the parsed CLI into a [`RunConfig`].
    pub fn build_config(&self) -> Result<RunConfig, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::OutOfRange {
                name: "concurrency",
                min: 1,
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                name: "timeout-secs",
                min: 1,
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::OutOfRange {
                name: "max-retries",
                min: 1,
            });
        }

        let mode = if self.local {
            Mode::Local {
                output: self.output.clone(),
            }
        } else if self.dry_run {
            Mode::DryRun
        } else {
            Mode::Remote(self.remote_config()?)
        };

        Ok(RunConfig {
            docs_dir: self.docs_dir.clone(),
            base_url: self.base_url.clone(),
            mode,
            branch: non_blank(self.branch.as_deref()),
            configure_index: self.configure_index,
            sync: SyncOptions {
                concurrency: self.concurrency,
                ..SyncOptions::default()
            },
        })
    }

    fn remote_config(&self) -> Result<RemoteConfig, ConfigError> {
        let app_id = non_blank(self.app_id.as_deref()).ok_or(ConfigError::Missing("app-id"))?;
        let api_key = non_blank(self.api_key.as_deref()).ok_or(ConfigError::Missing("api-key"))?;
        let index_name =
            non_blank(self.index_name.as_deref()).ok_or(ConfigError::Missing("index-name"))?;
        let endpoint = match non_blank(self.endpoint.as_deref()) {
            Some(raw) => Some(parse_endpoint(&raw)?),
            None => None,
        };
        Ok(RemoteConfig {
            app_id,
            api_key,
            index_name,
            endpoint,
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidEndpoint(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEndpoint(raw.to_string()));
    }
    Ok(url)
}

/// Where synthesized records go.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// JSON array written to `output`, without sync metadata.
    Local {
        /// Artifact path.
        output: PathBuf,
    },
    /// Full sync protocol against an in-memory index.
    DryRun,
    /// Full sync protocol against the hosted index.
    Remote(RemoteConfig),
}

/// Validated settings for one indexing run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Root of finished documents.
    pub docs_dir: PathBuf,
    /// Public URL prefix.
    pub base_url: String,
    /// Output mode.
    pub mode: Mode,
    /// Explicit branch override.
    pub branch: Option<String>,
    /// Push index settings before syncing.
    pub configure_index: bool,
    /// Synchronizer knobs.
    pub sync: SyncOptions,
}

/// Credentials and client settings for the hosted index.
#[derive(Clone, PartialEq)]
pub struct RemoteConfig {
    /// Application id.
    pub app_id: String,
    /// Admin API key.
    pub api_key: String,
    /// Target index.
    pub index_name: String,
    /// Base URL override.
    pub endpoint: Option<Url>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per request.
    pub max_retries: usize,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("index_name", &self.index_name)
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
