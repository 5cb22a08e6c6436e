//! End-to-end run: load → extract → synthesize → artifact or sync.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::batch::BatchStamp;
use crate::config::{Mode, RunConfig};
use crate::error::PipelineError;
use crate::extractor;
use crate::index::{AlgoliaIndex, IndexService, IndexSettings, MemoryIndex};
use crate::loader::{Document, DocumentLoader, SkippedDocument};
use crate::record::{self, SearchRecord};
use crate::sync::{IndexSynchronizer, SyncOptions, SyncReport};

/// Records built from one docs root.
#[derive(Debug, Default)]
pub struct Collected {
    /// Records for every loaded document, in discovery order.
    pub records: Vec<SearchRecord>,
    /// Documents that produced records.
    pub files_processed: usize,
    /// Documents left out.
    pub skipped: Vec<SkippedDocument>,
}

/// Counters printed at the end of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Documents loaded and extracted.
    pub files_processed: usize,
    /// Documents skipped.
    pub files_skipped: usize,
    /// Records synthesized.
    pub records_generated: usize,
    /// Upsert chunks acknowledged (0 in local mode).
    pub chunks_pushed: usize,
    /// Stale records removed (0 in local mode).
    pub stale_deleted: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files processed: {}, files skipped: {}, records generated: {}, chunks pushed: {}, stale records deleted: {}",
            self.files_processed,
            self.files_skipped,
            self.records_generated,
            self.chunks_pushed,
            self.stale_deleted
        )
    }
}

/// Records for a single document. Each call owns its slug counter and positions.
pub fn document_records(document: &Document) -> Vec<SearchRecord> {
    let units = extractor::extract(&document.title, &document.tree);
    record::synthesize(document, units)
}

/// Extracts every document in parallel, keeping discovery order in the output.
pub fn build_records(documents: &[Document]) -> Vec<SearchRecord> {
    let per_document: Vec<Vec<SearchRecord>> =
        documents.par_iter().map(document_records).collect();
    per_document.into_iter().flatten().collect()
}

/// Loads the docs root and builds its records.
pub fn collect(loader: &DocumentLoader) -> Result<Collected, PipelineError> {
    let outcome = loader.load()?;

    if !outcome.skipped.is_empty() {
        let mut by_reason: BTreeMap<&'static str, usize> = BTreeMap::new();
        for skipped in &outcome.skipped {
            *by_reason.entry(skipped.reason.label()).or_default() += 1;
        }
        for (reason, count) in by_reason {
            warn!(reason, count, "skipped documents");
        }
    }

    let records = build_records(&outcome.documents);
    info!(
        root = %loader.root().display(),
        documents = outcome.documents.len(),
        records = records.len(),
        "built search records"
    );
    Ok(Collected {
        records,
        files_processed: outcome.documents.len(),
        skipped: outcome.skipped,
    })
}

/// Writes records as a JSON array, without sync metadata.
pub fn write_artifact(path: &Path, records: &[SearchRecord]) -> Result<(), PipelineError> {
    let io_err = |source| PipelineError::Artifact {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let unstamped: Vec<SearchRecord> = records.iter().cloned().map(SearchRecord::unstamped).collect();
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut writer, &unstamped)?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    info!(path = %path.display(), records = records.len(), "wrote local search index");
    Ok(())
}

/// Optionally configures `index`, then runs the synchronizer.
pub async fn sync_records<S: IndexService + ?Sized>(
    index: &S,
    records: Vec<SearchRecord>,
    stamp: &BatchStamp,
    options: SyncOptions,
    configure: bool,
) -> Result<SyncReport, PipelineError> {
    if configure {
        index.configure(&IndexSettings::default()).await?;
        info!("applied index settings");
    }
    let mut synchronizer = IndexSynchronizer::new(index, options);
    Ok(synchronizer.run(records, stamp).await?)
}

/// Executes one run described by `config`.
pub async fn run(config: &RunConfig) -> Result<RunSummary, PipelineError> {
    let loader = DocumentLoader::new(&config.docs_dir, config.base_url.clone());
    let collected = collect(&loader)?;
    let mut summary = RunSummary {
        files_processed: collected.files_processed,
        files_skipped: collected.skipped.len(),
        records_generated: collected.records.len(),
        ..RunSummary::default()
    };

    let report = match &config.mode {
        Mode::Local { output } => {
            write_artifact(output, &collected.records)?;
            return Ok(summary);
        }
        Mode::DryRun => {
            let index = MemoryIndex::new();
            let stamp = BatchStamp::generate(config.branch.as_deref());
            info!(branch = %stamp.branch, batch = %stamp.batch_id, "dry run against in-memory index");
            sync_records(&index, collected.records, &stamp, config.sync, config.configure_index)
                .await?
        }
        Mode::Remote(remote) => {
            let index = AlgoliaIndex::new(
                &remote.app_id,
                &remote.api_key,
                &remote.index_name,
                remote.endpoint.clone(),
                remote.timeout,
                remote.max_retries,
            )?;
            let stamp = BatchStamp::generate(config.branch.as_deref());
            info!(
                index = index.index_name(),
                branch = %stamp.branch,
                batch = %stamp.batch_id,
                "syncing search index"
            );
            sync_records(&index, collected.records, &stamp, config.sync, config.configure_index)
                .await?
        }
    };

    summary.chunks_pushed = report.chunks_pushed;
    summary.stale_deleted = report.stale_deleted;
    Ok(summary)
}
