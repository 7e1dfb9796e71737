//! Scan orchestration.
//!
//! Drives normalize -> bucket -> score -> cluster over the whole track set.
//! The service owns every piece of scan state: one process-wide progress
//! snapshot it alone writes, the stored results of the last completed scan,
//! and the cancellation flag. Only one scan runs at a time; results are
//! all-or-nothing, so a cancelled or failed scan never exposes partial
//! groups.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ThresholdConfig;
use crate::library::TrackStore;

use super::cluster::{DuplicateGroup, build_groups};
use super::normalize::normalize_record;
use super::record::TrackRecord;
use super::score::{is_candidate, score_pair};
use super::signature::{BucketUnit, bucket_units, build_index};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan already in progress")]
    AlreadyRunning,
    #[error("scan cancelled")]
    Cancelled,
    #[error("no completed scan results available")]
    ResultsNotReady,
}

/// Lifecycle of the process-wide scan slot:
/// idle -> running -> completed | failed | cancelled, and any terminal state
/// back to running on the next start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

/// Snapshot of the current scan, safe to hand to any reader.
#[derive(Debug, Clone, Serialize)]
pub struct ScanProgress {
    pub status: ScanStatus,
    pub processed_count: usize,
    pub total_count: usize,
    pub groups_found: usize,
    pub malformed_records: usize,
    pub error: Option<String>,
}

impl ScanProgress {
    fn idle() -> Self {
        Self {
            status: ScanStatus::Idle,
            processed_count: 0,
            total_count: 0,
            groups_found: 0,
            malformed_records: 0,
            error: None,
        }
    }
}

/// Drives duplicate scans. Readers only ever see published snapshots; the
/// scan task is the sole writer.
pub struct ScanService {
    store: Arc<dyn TrackStore>,
    thresholds: ThresholdConfig,
    progress: RwLock<ScanProgress>,
    results: RwLock<Option<Arc<Vec<DuplicateGroup>>>>,
    cancel: Arc<AtomicBool>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

/// Construct the scan service with its progress channel.
pub fn create_scan_service(
    store: Arc<dyn TrackStore>,
    thresholds: ThresholdConfig,
) -> Arc<ScanService> {
    Arc::new(ScanService::new(store, thresholds))
}

impl ScanService {
    pub fn new(store: Arc<dyn TrackStore>, thresholds: ThresholdConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(64);
        Self {
            store,
            thresholds,
            progress: RwLock::new(ScanProgress::idle()),
            results: RwLock::new(None),
            cancel: Arc::new(AtomicBool::new(false)),
            progress_tx,
        }
    }

    /// Subscribe to progress updates: a sizing event once the record count
    /// is known, one event per bucket unit, and the terminal event.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> ScanProgress {
        self.progress.read().clone()
    }

    /// Groups from the last completed scan.
    pub fn results(&self) -> Result<Arc<Vec<DuplicateGroup>>, ScanError> {
        self.results.read().clone().ok_or(ScanError::ResultsNotReady)
    }

    /// Ask the running scan to stop at the next bucket boundary. Returns
    /// false when no scan is running.
    pub fn cancel(&self) -> bool {
        let running = self.progress.read().status == ScanStatus::Running;
        if running {
            info!("scan cancellation requested");
            self.cancel.store(true, Ordering::SeqCst);
        }
        running
    }

    /// Start a scan in the background. Fails fast when one is already
    /// running. The returned handle resolves once the scan reaches a
    /// terminal state; callers that only poll may drop it.
    pub fn start_scan(self: Arc<Self>) -> Result<JoinHandle<()>, ScanError> {
        self.try_start()?;
        info!("duplicate scan starting");

        let service = self;
        let handle = tokio::spawn(async move {
            let pipeline = tokio::task::spawn_blocking({
                let service = Arc::clone(&service);
                move || service.run_pipeline()
            });
            if let Err(join_err) = pipeline.await {
                warn!(error = %join_err, "scan task aborted");
                service.finish_failed(format!("scan task aborted: {join_err}"));
            }
        });
        Ok(handle)
    }

    /// The single-flight gate: transition any non-running state to running.
    /// Also invalidates previous results, since the new scan replaces them.
    fn try_start(&self) -> Result<(), ScanError> {
        let mut progress = self.progress.write();
        if progress.status == ScanStatus::Running {
            return Err(ScanError::AlreadyRunning);
        }
        *progress = ScanProgress {
            status: ScanStatus::Running,
            ..ScanProgress::idle()
        };
        self.cancel.store(false, Ordering::SeqCst);
        *self.results.write() = None;
        Ok(())
    }

    /// Synchronous pipeline body, run on a blocking thread.
    fn run_pipeline(&self) {
        let raw = match self.store.all_tracks() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "track store read failed");
                self.finish_failed(format!("track store failure: {err}"));
                return;
            }
        };

        let mut malformed_records = 0usize;
        let records: Vec<TrackRecord> = raw
            .iter()
            .map(|entry| {
                let normalized = normalize_record(entry);
                if normalized.malformed_fields > 0 {
                    malformed_records += 1;
                }
                normalized.record
            })
            .collect();

        let total = records.len();
        self.publish(|p| {
            p.total_count = total;
            p.malformed_records = malformed_records;
        });
        debug!(total, malformed_records, "records normalized");

        match self.detect(&records) {
            Ok(groups) => {
                info!(groups = groups.len(), "duplicate scan completed");
                let groups = Arc::new(groups);
                *self.results.write() = Some(Arc::clone(&groups));
                self.publish(|p| {
                    p.status = ScanStatus::Completed;
                    p.processed_count = p.total_count;
                    p.groups_found = groups.len();
                });
            }
            Err(ScanError::Cancelled) => {
                info!("duplicate scan cancelled");
                self.publish(|p| p.status = ScanStatus::Cancelled);
            }
            Err(err) => {
                warn!(error = %err, "duplicate scan failed");
                self.finish_failed(err.to_string());
            }
        }
    }

    /// Bucket, score in parallel, reduce to groups. The cancellation flag is
    /// observed between bucket units, never inside one.
    fn detect(&self, records: &[TrackRecord]) -> Result<Vec<DuplicateGroup>, ScanError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let index = build_index(records);
        let units = bucket_units(&index);
        debug!(buckets = units.len(), "bucket index built");

        let thresholds = self.thresholds;
        let processed = AtomicUsize::new(0);

        let unit_edges: Result<Vec<Vec<(usize, usize)>>, ScanError> = units
            .par_iter()
            .map(|unit| {
                if self.cancel.load(Ordering::SeqCst) {
                    return Err(ScanError::Cancelled);
                }

                // A panic in one unit's scoring loses that unit's pairs,
                // never the scan.
                let edges = catch_unwind(AssertUnwindSafe(|| {
                    score_unit(records, unit, &thresholds)
                }))
                .unwrap_or_else(|_| {
                    warn!(
                        duration_bucket = unit.signature.duration_bucket,
                        size_bucket = unit.signature.size_bucket,
                        "scoring panicked for bucket unit; treating its pairs as non-matching"
                    );
                    Vec::new()
                });

                let done =
                    processed.fetch_add(unit.members.len(), Ordering::Relaxed) + unit.members.len();
                self.publish(|p| p.processed_count = p.processed_count.max(done));
                Ok(edges)
            })
            .collect();

        let edges: Vec<(usize, usize)> = unit_edges?.into_iter().flatten().collect();
        if self.cancel.load(Ordering::SeqCst) {
            return Err(ScanError::Cancelled);
        }

        debug!(candidate_pairs = edges.len(), "clustering candidate pairs");
        Ok(build_groups(records, &edges))
    }

    /// Update the snapshot under the write lock, then broadcast it. The scan
    /// task is the only caller.
    fn publish<F: FnOnce(&mut ScanProgress)>(&self, update: F) {
        let snapshot = {
            let mut progress = self.progress.write();
            update(&mut progress);
            progress.clone()
        };
        let _ = self.progress_tx.send(snapshot);
    }

    fn finish_failed(&self, message: String) {
        self.publish(|p| {
            p.status = ScanStatus::Failed;
            p.error = Some(message);
        });
    }
}

/// Score every candidate pair of one bucket unit, returning the edges that
/// pass the gates.
fn score_unit(
    records: &[TrackRecord],
    unit: &BucketUnit,
    thresholds: &ThresholdConfig,
) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for (pos, &i) in unit.members.iter().enumerate() {
        for &j in &unit.members[pos + 1..] {
            push_if_candidate(records, i, j, thresholds, &mut edges);
        }
        for &j in &unit.later_neighbors {
            push_if_candidate(records, i, j, thresholds, &mut edges);
        }
    }
    edges
}

fn push_if_candidate(
    records: &[TrackRecord],
    i: usize,
    j: usize,
    thresholds: &ThresholdConfig,
    edges: &mut Vec<(usize, usize)>,
) {
    let score = score_pair(&records[i], &records[j]);
    if is_candidate(&score, thresholds) {
        edges.push((i, j));
    }
}
