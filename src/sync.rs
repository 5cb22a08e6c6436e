//! Write-then-garbage-collect synchronization against an [`IndexService`].
//!
//! A run moves through `Idle → Upserting → Cleaning → Done`, or ends in
//! `Failed`. `Cleaning` is only entered after every upsert chunk has been
//! acknowledged, so stale deletion never runs against an incomplete write.

use std::collections::HashSet;
use std::fmt;

use futures_util::stream::{self, TryStreamExt};
use tracing::{debug, info, warn};

use crate::batch::BatchStamp;
use crate::error::{IndexError, SyncError};
use crate::index::{IndexService, StaleFilter, MAX_DELETE_BATCH};
use crate::record::SearchRecord;

/// Request-size ceiling for one upsert chunk (4.5 MiB).
pub const MAX_CHUNK_BYTES: usize = 4_718_592;
/// Default number of upsert chunks in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

// `{"action":"updateObject","body":` + `},`
const RECORD_ENVELOPE_BYTES: usize = 34;
// `{"requests":[` + `]}`
const REQUEST_WRAPPER_BYTES: usize = 15;

/// Phase of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Nothing written yet.
    Idle,
    /// Pushing record chunks.
    Upserting,
    /// Finding and deleting stale records.
    Cleaning,
    /// Finished successfully.
    Done,
    /// Aborted.
    Failed,
}

impl SyncPhase {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(self, next: SyncPhase) -> bool {
        matches!(
            (self, next),
            (SyncPhase::Idle, SyncPhase::Upserting)
                | (SyncPhase::Upserting, SyncPhase::Cleaning)
                | (SyncPhase::Upserting, SyncPhase::Failed)
                | (SyncPhase::Cleaning, SyncPhase::Done)
                | (SyncPhase::Cleaning, SyncPhase::Failed)
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Upserting => "upserting",
            SyncPhase::Cleaning => "cleaning",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Knobs for one synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Byte ceiling for a single upsert request.
    pub max_chunk_bytes: usize,
    /// Upsert chunks in flight at once.
    pub concurrency: usize,
    /// Ids per delete call, clamped to [`MAX_DELETE_BATCH`].
    pub delete_batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_chunk_bytes: MAX_CHUNK_BYTES,
            concurrency: DEFAULT_CONCURRENCY,
            delete_batch_size: MAX_DELETE_BATCH,
        }
    }
}

/// Counters reported after a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Upsert chunks acknowledged.
    pub chunks_pushed: usize,
    /// Records written.
    pub records_pushed: usize,
    /// Stale ids found by the browse.
    pub stale_found: usize,
    /// Stale ids deleted.
    pub stale_deleted: usize,
}

/// Drives one run against `index`.
pub struct IndexSynchronizer<'a, S: IndexService + ?Sized> {
    index: &'a S,
    options: SyncOptions,
    phase: SyncPhase,
    history: Vec<SyncPhase>,
}

impl<'a, S: IndexService + ?Sized> IndexSynchronizer<'a, S> {
    /// Synchronizer in the `Idle` phase.
    pub fn new(index: &'a S, options: SyncOptions) -> Self {
        Self {
            index,
            options,
            phase: SyncPhase::Idle,
            history: vec![SyncPhase::Idle],
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> &[SyncPhase] {
        &self.history
    }

    fn transition(&mut self, next: SyncPhase) -> Result<(), SyncError> {
        if !self.phase.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = %self.phase, to = %next, "sync phase");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self) {
        if self.phase.can_transition_to(SyncPhase::Failed) {
            self.phase = SyncPhase::Failed;
            self.history.push(SyncPhase::Failed);
        }
    }

    /// Stamps `records` with `stamp`, upserts them, then deletes every record
    /// of the same branch written by another batch.
    pub async fn run(
        &mut self,
        mut records: Vec<SearchRecord>,
        stamp: &BatchStamp,
    ) -> Result<SyncReport, SyncError> {
        self.transition(SyncPhase::Upserting)?;
        for record in &mut records {
            record.stamp(stamp);
        }
        let current: HashSet<String> = records.iter().map(|r| r.object_id.clone()).collect();

        let mut report = SyncReport::default();
        match self.upsert_all(records).await {
            Ok((chunks, pushed)) => {
                report.chunks_pushed = chunks;
                report.records_pushed = pushed;
            }
            Err(err) => {
                self.fail();
                return Err(err);
            }
        }

        self.transition(SyncPhase::Cleaning)?;
        let filter = StaleFilter::new(&stamp.branch, &stamp.batch_id);
        match self.collect_stale(&filter, &current).await {
            Ok(stale) => {
                report.stale_found = stale.len();
                match self.delete_all(&stale).await {
                    Ok(deleted) => report.stale_deleted = deleted,
                    Err(err) => {
                        self.fail();
                        return Err(err);
                    }
                }
            }
            Err(err) => {
                self.fail();
                return Err(err);
            }
        }

        self.transition(SyncPhase::Done)?;
        info!(
            branch = %stamp.branch,
            batch = %stamp.batch_id,
            chunks = report.chunks_pushed,
            records = report.records_pushed,
            stale_deleted = report.stale_deleted,
            "index sync complete"
        );
        Ok(report)
    }

    async fn upsert_all(&self, records: Vec<SearchRecord>) -> Result<(usize, usize), SyncError> {
        let total = records.len();
        let chunks = chunk_records(records, self.options.max_chunk_bytes)?;
        let count = chunks.len();
        let index = self.index;

        stream::iter(chunks.into_iter().enumerate().map(Ok::<_, IndexError>))
            .try_for_each_concurrent(self.options.concurrency.max(1), |(n, chunk)| async move {
                index.upsert(&chunk).await?;
                info!(chunk = n + 1, of = count, records = chunk.len(), "pushed chunk");
                Ok(())
            })
            .await
            .map_err(|source| SyncError::Index {
                phase: SyncPhase::Upserting,
                source,
            })?;
        Ok((count, total))
    }

    async fn collect_stale(
        &self,
        filter: &StaleFilter,
        current: &HashSet<String>,
    ) -> Result<Vec<String>, SyncError> {
        let mut stale = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .index
                .browse(filter, cursor.as_deref())
                .await
                .map_err(|source| SyncError::Index {
                    phase: SyncPhase::Cleaning,
                    source,
                })?;
            // Ids rewritten by this batch can still surface with their old stamp
            // until the index catches up.
            stale.extend(page.object_ids.into_iter().filter(|id| !current.contains(id)));
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        info!(filter = %filter.expression(), stale = stale.len(), "collected stale records");
        Ok(stale)
    }

    async fn delete_all(&self, stale: &[String]) -> Result<usize, SyncError> {
        if stale.is_empty() {
            return Ok(0);
        }
        let size = self.options.delete_batch_size.clamp(1, MAX_DELETE_BATCH);
        let mut deleted = 0;
        for batch in stale.chunks(size) {
            self.index
                .delete(batch)
                .await
                .map_err(|source| SyncError::Index {
                    phase: SyncPhase::Cleaning,
                    source,
                })?;
            deleted += batch.len();
            debug!(deleted, total = stale.len(), "deleted stale batch");
        }
        Ok(deleted)
    }
}

/// Splits records into chunks whose serialized batch body stays under `max_bytes`.
///
/// The body size counts the `requests` wrapper and each record's action
/// envelope. A record larger than `max_bytes` on its own is sent alone.
pub fn chunk_records(
    records: Vec<SearchRecord>,
    max_bytes: usize,
) -> Result<Vec<Vec<SearchRecord>>, SyncError> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = REQUEST_WRAPPER_BYTES;

    for record in records {
        let size = serde_json::to_vec(&record)
            .map_err(|source| SyncError::Serialize {
                object_id: record.object_id.clone(),
                source,
            })?
            .len()
            + RECORD_ENVELOPE_BYTES;
        if size + REQUEST_WRAPPER_BYTES > max_bytes {
            warn!(object_id = %record.object_id, size, "record exceeds chunk ceiling");
        }
        if !current.is_empty() && current_bytes + size > max_bytes {
            chunks.push(std::mem::take(&mut current));
            current_bytes = REQUEST_WRAPPER_BYTES;
        }
        current_bytes += size;
        current.push(record);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}
