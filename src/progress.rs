use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::db::Store;
use crate::model::{ImportProgress, ImportStatus};

/// Partial update; `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub total: Option<u64>,
    pub processed: Option<u64>,
    pub failed: Option<u64>,
    pub last_processed_card: Option<String>,
}

/// Shared run status. Observers read snapshots via [`ProgressReporter::get`].
///
/// Optionally mirrored into the store's `import_progress` row and rendered as
/// a terminal progress bar. Both are refreshed on every state change, which
/// the pipeline only makes at batch boundaries.
pub struct ProgressReporter {
    state: Mutex<ImportProgress>,
    mirror: Option<Arc<Store>>,
    bar: ProgressBar,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        ProgressReporter {
            state: Mutex::new(ImportProgress::default()),
            mirror: None,
            bar: ProgressBar::hidden(),
        }
    }

    pub fn with_mirror(mut self, store: Arc<Store>) -> Self {
        self.mirror = Some(store);
        self
    }

    /// Draw a progress bar on stderr.
    pub fn with_bar(mut self) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        self.bar = bar;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ImportProgress> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> ImportProgress {
        self.lock().clone()
    }

    /// `idle|completed|failed -> running`. Counters restart at `processed`.
    pub fn start(&self, processed: u64) {
        let snapshot = {
            let mut p = self.lock();
            *p = ImportProgress {
                processed,
                status: ImportStatus::Running,
                started_at: Some(Utc::now()),
                ..Default::default()
            };
            p.clone()
        };
        self.bar.reset();
        self.publish(&snapshot);
    }

    pub fn update(&self, update: ProgressUpdate) {
        let snapshot = {
            let mut p = self.lock();
            if let Some(total) = update.total {
                p.total = total;
            }
            if let Some(processed) = update.processed {
                p.processed = processed;
            }
            if let Some(failed) = update.failed {
                p.failed = failed;
            }
            if let Some(card) = update.last_processed_card {
                p.last_processed_card = Some(card);
            }
            p.clone()
        };
        self.publish(&snapshot);
    }

    pub fn complete(&self) {
        if let Some(snapshot) = self.finish(ImportStatus::Completed, None) {
            info!(
                "Import completed: {} processed, {} failed",
                snapshot.processed, snapshot.failed
            );
            self.bar.finish_and_clear();
        }
    }

    pub fn fail(&self, message: &str) {
        if let Some(snapshot) = self.finish(ImportStatus::Failed, Some(message.to_string())) {
            warn!(
                "Import failed after {} processed: {}",
                snapshot.processed, message
            );
            self.bar.abandon_with_message(message.to_string());
        }
    }

    fn finish(&self, status: ImportStatus, error: Option<String>) -> Option<ImportProgress> {
        let snapshot = {
            let mut p = self.lock();
            if p.status != ImportStatus::Running {
                warn!("Ignoring {} transition from {}", status, p.status);
                return None;
            }
            p.status = status;
            p.completed_at = Some(Utc::now());
            p.error_message = error;
            p.clone()
        };
        self.publish(&snapshot);
        Some(snapshot)
    }

    fn publish(&self, p: &ImportProgress) {
        self.bar.set_length(p.total.max(p.processed));
        self.bar.set_position(p.processed);
        if let Some(card) = &p.last_processed_card {
            self.bar.set_message(card.clone());
        }
        if let Some(store) = &self.mirror {
            if let Err(e) = store.save_progress(p) {
                warn!("Failed to mirror import progress: {:#}", e);
            }
        }
    }
}
