//! In-process registry of running scan tasks.
//!
//! Every background scan is registered under its scan id before it is
//! spawned and removes itself when it finishes. The registry owns the join
//! handle and the live progress counters that the status endpoint reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};

use crate::services::scanner::{ScanObserver, ScanPhase};

/// Live progress of one scan, updated from the scan task.
#[derive(Debug, Default)]
pub struct ScanProgress {
    phase: AtomicU8,
    processed: AtomicUsize,
    total: AtomicUsize,
}

/// Point-in-time copy of [`ScanProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub phase: ScanPhase,
    pub processed: usize,
    pub total: usize,
}

fn phase_to_u8(phase: ScanPhase) -> u8 {
    match phase {
        ScanPhase::Fetching => 0,
        ScanPhase::Analyzing => 1,
        ScanPhase::Completed => 2,
        ScanPhase::Error => 3,
    }
}

fn phase_from_u8(value: u8) -> ScanPhase {
    match value {
        1 => ScanPhase::Analyzing,
        2 => ScanPhase::Completed,
        3 => ScanPhase::Error,
        _ => ScanPhase::Fetching,
    }
}

impl ScanProgress {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: phase_from_u8(self.phase.load(Ordering::Acquire)),
            processed: self.processed.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }
}

impl ScanObserver for ScanProgress {
    fn on_status(&self, phase: ScanPhase, _message: &str) {
        self.phase.store(phase_to_u8(phase), Ordering::Release);
    }

    fn on_progress(&self, processed: usize, total: usize) {
        self.total.store(total, Ordering::Release);
        self.processed.store(processed, Ordering::Release);
    }
}

struct ScanEntry {
    progress: Arc<ScanProgress>,
    handle: Option<JoinHandle<()>>,
}

/// Removes a scan from its registry on drop.
pub struct FinishGuard {
    registry: ScanRegistry,
    scan_id: String,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.registry.finish(&self.scan_id);
    }
}

/// Registry of running scans keyed by scan id.
#[derive(Clone, Default)]
pub struct ScanRegistry {
    entries: Arc<Mutex<HashMap<String, ScanEntry>>>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ScanEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a scan before its task is spawned.
    pub fn register(&self, scan_id: &str) -> Arc<ScanProgress> {
        let progress = Arc::new(ScanProgress::default());
        self.lock().insert(
            scan_id.to_string(),
            ScanEntry {
                progress: progress.clone(),
                handle: None,
            },
        );
        progress
    }

    /// Hand the spawned task to the registry. A task that already finished
    /// has removed its entry, in which case the handle is dropped.
    pub fn attach(&self, scan_id: &str, handle: JoinHandle<()>) {
        if let Some(entry) = self.lock().get_mut(scan_id) {
            entry.handle = Some(handle);
        }
    }

    /// Remove a scan once its task is done.
    pub fn finish(&self, scan_id: &str) {
        self.lock().remove(scan_id);
    }

    /// Deregister the scan when the returned guard is dropped, including when
    /// the owning task panics or is aborted.
    pub fn finish_on_drop(&self, scan_id: &str) -> FinishGuard {
        FinishGuard {
            registry: self.clone(),
            scan_id: scan_id.to_string(),
        }
    }

    pub fn is_active(&self, scan_id: &str) -> bool {
        self.lock().contains_key(scan_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Live progress of a running scan.
    pub fn progress(&self, scan_id: &str) -> Option<ProgressSnapshot> {
        self.lock().get(scan_id).map(|entry| entry.progress.snapshot())
    }

    /// Abort handle for a running scan's task.
    ///
    /// Nothing aborts scans today. Aborting deregisters the scan but leaves
    /// the ledger row `running` until the next trigger fails it as stale.
    pub fn abort_handle(&self, scan_id: &str) -> Option<AbortHandle> {
        self.lock()
            .get(scan_id)
            .and_then(|entry| entry.handle.as_ref().map(JoinHandle::abort_handle))
    }
}
