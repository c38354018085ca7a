use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::BatchProcessor;
use crate::checkpoint::CheckpointManager;
use crate::config::{RetryPolicy, RunOptions, Settings};
use crate::db::{Persister, Store};
use crate::enrich::{EffectEnricher, OpenAiGenerator};
use crate::error::{FetchError, ImportError};
use crate::model::{CardRecord, ImportProgress, ImportStatus};
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::ratelimit::RateLimiter;
use crate::scryfall::{build_query, PageSource, ScryfallClient, SearchPage};

pub const CANCELLED_MESSAGE: &str = "import cancelled";

const COST_PER_CARD_USD: f64 = 0.002;
const SECONDS_PER_CARD: f64 = 2.0;
const BYTES_PER_CARD: u64 = 2 * 1024;

/// Why a run stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Exhausted,
    Capped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: u32,
    pub persisted: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Records stored so far, including the resumed checkpoint's count.
    /// Dedup skips never count, so a re-fetched page adds nothing.
    pub processed: u64,
    pub end: RunEnd,
}

// ── Run loop ──

/// One pass over the source: page → batches → checkpoint + progress.
pub struct Importer {
    source: Arc<dyn PageSource>,
    batches: BatchProcessor,
    checkpoints: CheckpointManager,
    progress: Arc<ProgressReporter>,
    retry: RetryPolicy,
}

impl Importer {
    pub fn new(
        source: Arc<dyn PageSource>,
        batches: BatchProcessor,
        checkpoints: CheckpointManager,
        progress: Arc<ProgressReporter>,
        retry: RetryPolicy,
    ) -> Self {
        Importer {
            source,
            batches,
            checkpoints,
            progress,
            retry,
        }
    }

    /// Drive a full run and leave the progress record in a terminal state.
    pub async fn run(
        &self,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, ImportError> {
        let (start_page, start_processed) = match options
            .resume_from_checkpoint
            .then(|| self.checkpoints.load())
            .flatten()
        {
            Some(cp) => {
                info!("Resuming from page {} ({} processed)", cp.page, cp.total_processed);
                (cp.page, cp.total_processed)
            }
            None => (1, 0),
        };

        self.progress.start(start_processed);
        let result = self.run_pages(options, cancel, start_page, start_processed).await;

        match &result {
            Ok(summary) if summary.end == RunEnd::Cancelled => {
                info!("Import cancelled; checkpoint kept for resume");
                self.progress.fail(CANCELLED_MESSAGE);
            }
            Ok(_) => {
                if let Err(e) = self.checkpoints.clear() {
                    warn!("{:#}", e);
                }
                self.progress.complete();
            }
            Err(e) => self.progress.fail(&e.to_string()),
        }
        result
    }

    async fn run_pages(
        &self,
        options: &RunOptions,
        cancel: &CancellationToken,
        start_page: u32,
        start_processed: u64,
    ) -> Result<RunSummary, ImportError> {
        let query = build_query(&options.set_codes);
        info!("Import query: {}", query);

        let mut summary = RunSummary {
            pages: 0,
            persisted: 0,
            skipped: 0,
            failed: 0,
            processed: start_processed,
            end: RunEnd::Exhausted,
        };
        let mut handed = 0usize;
        let mut last_card = String::new();
        let mut page = start_page;

        loop {
            if cancel.is_cancelled() {
                summary.end = RunEnd::Cancelled;
                return Ok(summary);
            }

            let Some(result) = self
                .fetch_with_retry(&query, page, cancel)
                .await
                .map_err(|source| ImportError::Fetch { page, source })?
            else {
                summary.end = RunEnd::Cancelled;
                return Ok(summary);
            };

            if summary.pages == 0 {
                if let Some(total) = result.total_cards {
                    let total = match options.max_records {
                        Some(max) => total.min(max as u64),
                        None => total,
                    };
                    self.progress.update(ProgressUpdate {
                        total: Some(total),
                        ..Default::default()
                    });
                }
            }
            summary.pages += 1;

            let mut records = result.records;
            if records.is_empty() {
                break;
            }
            info!("Page {}: {} records", page, records.len());

            let mut capped = false;
            if let Some(max) = options.max_records {
                let room = max.saturating_sub(handed);
                if records.len() >= room {
                    records.truncate(room);
                    capped = true;
                }
            }

            for chunk in records.chunks(options.batch_size) {
                if cancel.is_cancelled() {
                    summary.end = RunEnd::Cancelled;
                    return Ok(summary);
                }

                let outcome = self.batches.run_batch(chunk, options.enrich_with_ai).await;
                handed += chunk.len();
                summary.persisted += outcome.persisted;
                summary.skipped += outcome.skipped;
                summary.failed += outcome.failed;
                summary.processed += outcome.persisted;
                if let Some(name) = outcome.last_name {
                    last_card = name;
                }

                if let Err(e) = self.checkpoints.save(page, summary.processed, &last_card) {
                    warn!("Checkpoint not saved: {:#}", e);
                }
                self.progress.update(ProgressUpdate {
                    processed: Some(summary.processed),
                    failed: Some(summary.failed),
                    last_processed_card: Some(last_card.clone()).filter(|s| !s.is_empty()),
                    ..Default::default()
                });
            }

            if capped {
                info!("Reached max of {} records", handed);
                summary.end = RunEnd::Capped;
                break;
            }
            if !result.has_more {
                break;
            }
            page += 1;
        }

        info!(
            "Import finished after {} pages: {} persisted, {} skipped, {} failed",
            summary.pages, summary.persisted, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// `Ok(None)` when cancelled while backing off.
    async fn fetch_with_retry(
        &self,
        query: &str,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<SearchPage>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.source.fetch_page(query, page).await {
                Ok(result) => return Ok(Some(result)),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let backoff = self.retry.delay(attempt);
                    warn!(
                        "Page {} failed (attempt {}/{}): {}, backing off {:.1}s",
                        page,
                        attempt + 1,
                        self.retry.max_retries,
                        e,
                        backoff.as_secs_f64()
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ── Service ──

/// Handle to a spawned run.
pub struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<RunSummary, ImportError>>,
}

impl RunHandle {
    /// Stop before the next batch starts. The current batch finishes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<RunSummary, ImportError> {
        self.join
            .await
            .map_err(|e| ImportError::Aborted(e.to_string()))?
    }
}

/// Clears the run flag however the task ends, panics included.
struct RunGuard {
    running: Arc<AtomicBool>,
    progress: Arc<ProgressReporter>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.progress.get().status == ImportStatus::Running {
            self.progress.fail("import task aborted");
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// What an import over a query would cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub total_cards: u64,
    pub cost_usd: f64,
    pub hours: f64,
    pub storage_bytes: u64,
}

impl Estimate {
    pub fn for_cards(total_cards: u64) -> Self {
        Estimate {
            total_cards,
            cost_usd: total_cards as f64 * COST_PER_CARD_USD,
            hours: total_cards as f64 * SECONDS_PER_CARD / 3600.0,
            storage_bytes: total_cards * BYTES_PER_CARD,
        }
    }

    pub fn days(&self) -> f64 {
        self.hours / 24.0
    }
}

/// Entry point for callers outside the crate. At most one run at a time.
pub struct ImportService {
    importer: Arc<Importer>,
    persister: Arc<dyn Persister>,
    progress: Arc<ProgressReporter>,
    running: Arc<AtomicBool>,
    active: Mutex<Option<CancellationToken>>,
}

impl ImportService {
    pub fn new(
        importer: Arc<Importer>,
        persister: Arc<dyn Persister>,
        progress: Arc<ProgressReporter>,
    ) -> Self {
        ImportService {
            importer,
            persister,
            progress,
            running: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    /// Wire the production stack: SQLite store, Scryfall client, OpenAI generator.
    pub fn from_settings(settings: &Settings, show_progress: bool) -> anyhow::Result<Self> {
        let store = Arc::new(Store::open(&settings.db_path)?);

        let fetch_limiter = Arc::new(RateLimiter::new(settings.fetch_interval()));
        let source = Arc::new(ScryfallClient::new(settings, fetch_limiter)?);

        let enrich_limiter = Arc::new(RateLimiter::new(settings.enrich_interval()));
        let generator = Arc::new(OpenAiGenerator::new(settings)?);
        let enricher = Arc::new(EffectEnricher::new(
            generator,
            enrich_limiter,
            settings.generation_timeout(),
            settings.retry_policy(),
        ));

        let mut progress = ProgressReporter::new().with_mirror(Arc::clone(&store));
        if show_progress {
            progress = progress.with_bar();
        }
        let progress = Arc::new(progress);

        let importer = Importer::new(
            source,
            BatchProcessor::new(store.clone(), enricher, settings.enrich_concurrency),
            CheckpointManager::new(settings.checkpoint_path.clone()),
            Arc::clone(&progress),
            settings.retry_policy(),
        );
        Ok(ImportService::new(Arc::new(importer), store, progress))
    }

    pub fn start_import(&self, options: RunOptions) -> Result<RunHandle, ImportError> {
        options.validate()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ImportError::AlreadyRunning);
        }

        let guard = RunGuard {
            running: Arc::clone(&self.running),
            progress: Arc::clone(&self.progress),
        };
        let cancel = CancellationToken::new();
        if let Ok(mut active) = self.active.lock() {
            *active = Some(cancel.clone());
        }

        let importer = Arc::clone(&self.importer);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            importer.run(&options, &token).await
        });

        Ok(RunHandle { cancel, join })
    }

    /// Cancel the active run, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.active.lock() {
            Ok(active) => active.as_ref().map(|t| t.cancel()).is_some(),
            Err(_) => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn import_status(&self) -> ImportProgress {
        self.progress.get()
    }

    pub fn card_exists(&self, scryfall_id: &str) -> anyhow::Result<bool> {
        self.persister.exists(scryfall_id)
    }

    pub fn insert_card(&self, card: &CardRecord) -> anyhow::Result<bool> {
        self.persister.upsert(card)
    }

    /// Size up an import from the first result page.
    pub async fn estimate(&self, set_codes: &[String]) -> Result<Estimate, ImportError> {
        let query = build_query(set_codes);
        let page = self
            .importer
            .fetch_with_retry(&query, 1, &CancellationToken::new())
            .await
            .map_err(|source| ImportError::Fetch { page: 1, source })?
            .unwrap_or_else(SearchPage::end);
        let total = page.total_cards.unwrap_or(page.records.len() as u64);
        Ok(Estimate::for_cards(total))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::batch::testing::{raw_card, MemoryPersister};
    use crate::enrich::testing::{enricher, ScriptedGenerator};

    /// Serves fixed pages; can inject failures, delays and a cancel trigger.
    #[derive(Default)]
    struct FakeSource {
        pages: Vec<Vec<Value>>,
        failures: Mutex<HashMap<u32, Vec<FetchError>>>,
        requested: Mutex<Vec<u32>>,
        cancel_on: Option<(u32, CancellationToken)>,
        delay: Duration,
        observe: Mutex<Option<Arc<ProgressReporter>>>,
        seen: Mutex<Vec<(u64, u64)>>,
    }

    impl FakeSource {
        fn with_pages(pages: usize, per_page: usize) -> Self {
            let pages = (0..pages)
                .map(|p| {
                    (0..per_page)
                        .map(|i| raw_card(&format!("p{p}-{i}"), &format!("Card {p}.{i}")))
                        .collect()
                })
                .collect();
            FakeSource { pages, ..Default::default() }
        }

        fn fail(&self, page: u32, errors: Vec<FetchError>) {
            self.failures.lock().unwrap().insert(page, errors);
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }

        fn total(&self) -> u64 {
            self.pages.iter().map(Vec::len).sum::<usize>() as u64
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch_page(&self, _query: &str, page: u32) -> Result<SearchPage, FetchError> {
            self.requested.lock().unwrap().push(page);
            if let Some(reporter) = self.observe.lock().unwrap().as_ref() {
                let p = reporter.get();
                self.seen.lock().unwrap().push((p.processed, p.failed));
            }
            if let Some((on, token)) = &self.cancel_on {
                if *on == page {
                    token.cancel();
                }
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(errors) = self.failures.lock().unwrap().get_mut(&page) {
                if !errors.is_empty() {
                    return Err(errors.remove(0));
                }
            }
            let Some(records) = self.pages.get(page as usize - 1) else {
                return Ok(SearchPage::end());
            };
            Ok(SearchPage {
                records: records.clone(),
                has_more: (page as usize) < self.pages.len(),
                total_cards: Some(self.total()),
            })
        }
    }

    struct Rig {
        dir: tempfile::TempDir,
        source: Arc<FakeSource>,
        persister: Arc<MemoryPersister>,
        progress: Arc<ProgressReporter>,
        importer: Arc<Importer>,
    }

    impl Rig {
        fn checkpoints(&self) -> CheckpointManager {
            CheckpointManager::new(self.checkpoint_path())
        }

        fn checkpoint_path(&self) -> std::path::PathBuf {
            self.dir.path().join("checkpoint.json")
        }

        fn service(&self) -> ImportService {
            ImportService::new(
                Arc::clone(&self.importer),
                self.persister.clone(),
                Arc::clone(&self.progress),
            )
        }
    }

    fn rig(source: FakeSource) -> Rig {
        rig_with(source, Arc::new(MemoryPersister::default()))
    }

    fn rig_with(source: FakeSource, persister: Arc<MemoryPersister>) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(source);
        let progress = Arc::new(ProgressReporter::new());
        let batches = BatchProcessor::new(
            persister.clone(),
            Arc::new(enricher(Arc::new(ScriptedGenerator::failing()))),
            2,
        );
        let importer = Importer::new(
            source.clone(),
            batches,
            CheckpointManager::new(dir.path().join("checkpoint.json")),
            Arc::clone(&progress),
            RetryPolicy { max_retries: 2, base_backoff: Duration::from_millis(1) },
        );
        Rig {
            dir,
            source,
            persister,
            progress,
            importer: Arc::new(importer),
        }
    }

    fn options(batch_size: usize) -> RunOptions {
        RunOptions { batch_size, ..Default::default() }
    }

    #[tokio::test]
    async fn full_run_completes_and_clears_checkpoint() {
        let r = rig(FakeSource::with_pages(3, 4));
        let summary = r.importer.run(&options(3), &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.end, RunEnd::Exhausted);
        assert_eq!(summary.persisted, 12);
        assert_eq!(summary.processed, 12);
        assert_eq!(r.persister.len(), 12);
        assert_eq!(r.source.requested(), vec![1, 2, 3]);
        assert!(!r.checkpoint_path().exists());

        let p = r.progress.get();
        assert_eq!(p.status, ImportStatus::Completed);
        assert_eq!(p.total, 12);
        assert_eq!(p.processed, 12);
        assert_eq!(p.last_processed_card.as_deref(), Some("Card 2.3"));
    }

    #[tokio::test]
    async fn rerun_persists_nothing_twice() {
        let r = rig(FakeSource::with_pages(2, 5));
        r.importer.run(&options(4), &CancellationToken::new()).await.unwrap();
        let upserts = r.persister.upserts();

        let again = r.importer.run(&options(4), &CancellationToken::new()).await.unwrap();
        assert_eq!(again.persisted, 0);
        assert_eq!(again.skipped, 10);
        assert_eq!(r.persister.len(), 10);
        assert_eq!(r.persister.upserts(), upserts);
    }

    #[tokio::test]
    async fn resumes_from_checkpoint_page() {
        let r = rig(FakeSource::with_pages(3, 2));
        r.checkpoints().save(2, 2, "Card 0.1").unwrap();

        let summary = r.importer.run(&options(10), &CancellationToken::new()).await.unwrap();
        assert_eq!(r.source.requested(), vec![2, 3]);
        assert_eq!(summary.persisted, 4);
        assert_eq!(summary.processed, 6);
        assert_eq!(r.progress.get().processed, 6);
    }

    #[tokio::test]
    async fn no_resume_ignores_checkpoint() {
        let r = rig(FakeSource::with_pages(2, 2));
        r.checkpoints().save(2, 2, "x").unwrap();
        let opts = RunOptions { resume_from_checkpoint: false, ..options(10) };
        r.importer.run(&opts, &CancellationToken::new()).await.unwrap();
        assert_eq!(r.source.requested(), vec![1, 2]);
        assert_eq!(r.persister.len(), 4);
    }

    #[tokio::test]
    async fn corrupt_checkpoint_starts_fresh() {
        let r = rig(FakeSource::with_pages(1, 2));
        std::fs::write(r.checkpoint_path(), "not json").unwrap();
        r.importer.run(&options(10), &CancellationToken::new()).await.unwrap();
        assert_eq!(r.source.requested(), vec![1]);
    }

    #[tokio::test]
    async fn interrupted_run_resumes_to_full_coverage() {
        let token = CancellationToken::new();
        let source = FakeSource {
            cancel_on: Some((2, token.clone())),
            ..FakeSource::with_pages(3, 3)
        };
        let persister = Arc::new(MemoryPersister::default());
        let r = rig_with(source, persister.clone());

        let first = r.importer.run(&options(3), &token).await.unwrap();
        assert_eq!(first.end, RunEnd::Cancelled);
        assert_eq!(persister.len(), 3);
        let cp = r.checkpoints().load().unwrap();
        assert_eq!(cp.page, 1);
        assert_eq!(cp.total_processed, 3);
        let p = r.progress.get();
        assert_eq!(p.status, ImportStatus::Failed);
        assert_eq!(p.error_message.as_deref(), Some(CANCELLED_MESSAGE));

        // Second run: a fresh source over the same data resumes at page 1.
        let r2 = rig_with(FakeSource::with_pages(3, 3), persister.clone());
        std::fs::copy(r.checkpoint_path(), r2.checkpoint_path()).unwrap();
        let second = r2.importer.run(&options(3), &CancellationToken::new()).await.unwrap();
        assert_eq!(r2.source.requested(), vec![1, 2, 3]);
        assert_eq!(second.skipped, 3);
        assert_eq!(second.persisted, 6);
        assert_eq!(persister.len(), 9);

        // The re-fetched page is not counted twice.
        assert_eq!(second.processed, 9);
        let p = r2.progress.get();
        assert_eq!(p.processed, 9);
        assert_eq!(p.total, 9);
        assert!(p.processed <= p.total);
    }

    #[tokio::test]
    async fn rerun_over_stored_data_adds_no_progress() {
        let r = rig(FakeSource::with_pages(2, 3));
        r.importer.run(&options(3), &CancellationToken::new()).await.unwrap();

        let again = r.importer.run(&options(3), &CancellationToken::new()).await.unwrap();
        assert_eq!(again.skipped, 6);
        assert_eq!(again.processed, 0);
        assert_eq!(r.progress.get().processed, 0);
    }

    #[tokio::test]
    async fn fetch_error_fails_run_but_keeps_checkpoint() {
        let source = FakeSource::with_pages(3, 2);
        source.fail(2, vec![FetchError::Status { status: 400, body: "bad query".into() }]);
        let r = rig(source);

        let err = r.importer.run(&options(10), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ImportError::Fetch { page: 2, .. }));
        let p = r.progress.get();
        assert_eq!(p.status, ImportStatus::Failed);
        assert!(p.error_message.unwrap().contains("bad query"));
        assert_eq!(r.checkpoints().load().unwrap().page, 1);
        assert_eq!(r.persister.len(), 2);
    }

    #[tokio::test]
    async fn transient_fetch_errors_are_retried() {
        let source = FakeSource::with_pages(2, 1);
        source.fail(
            2,
            vec![
                FetchError::Timeout,
                FetchError::Status { status: 503, body: String::new() },
            ],
        );
        let r = rig(source);

        let summary = r.importer.run(&options(10), &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.persisted, 2);
        assert_eq!(r.source.requested(), vec![1, 2, 2, 2]);
    }

    #[tokio::test]
    async fn max_records_truncates_crossing_page() {
        let r = rig(FakeSource::with_pages(3, 4));
        let opts = RunOptions { max_records: Some(6), ..options(3) };

        let summary = r.importer.run(&opts, &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.end, RunEnd::Capped);
        assert_eq!(r.persister.len(), 6);
        assert_eq!(r.source.requested(), vec![1, 2]);
        let p = r.progress.get();
        assert_eq!(p.total, 6);
        assert_eq!(p.status, ImportStatus::Completed);
    }

    #[tokio::test]
    async fn progress_moves_forward_only() {
        let source = FakeSource::with_pages(4, 3);
        let r = rig(source);
        *r.source.observe.lock().unwrap() = Some(Arc::clone(&r.progress));
        r.persister.reject.lock().unwrap().insert("p1-1".into());

        r.importer.run(&options(2), &CancellationToken::new()).await.unwrap();
        let seen = r.source.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
        let p = r.progress.get();
        assert_eq!(p.processed, 11);
        assert_eq!(p.failed, 1);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let source = FakeSource {
            delay: Duration::from_millis(50),
            ..FakeSource::with_pages(5, 1)
        };
        let r = rig(source);
        let service = r.service();

        let handle = service.start_import(options(1)).unwrap();
        assert!(service.is_running());
        assert!(matches!(
            service.start_import(options(1)),
            Err(ImportError::AlreadyRunning)
        ));

        assert!(service.cancel());
        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.end, RunEnd::Cancelled);
        assert!(!service.is_running());
        assert_eq!(service.import_status().status, ImportStatus::Failed);

        let handle = service.start_import(options(1)).unwrap();
        handle.wait().await.unwrap();
        assert_eq!(service.import_status().status, ImportStatus::Completed);
        assert_eq!(r.persister.len(), 5);
    }

    #[tokio::test]
    async fn invalid_options_never_start() {
        let r = rig(FakeSource::with_pages(1, 1));
        let service = r.service();
        let err = service.start_import(options(0)).err().unwrap();
        assert!(matches!(err, ImportError::InvalidOptions(_)));
        assert!(!service.is_running());
        assert!(r.source.requested().is_empty());
    }

    #[tokio::test]
    async fn service_delegates_card_storage() {
        let r = rig(FakeSource::default());
        let service = r.service();
        let card = CardRecord { scryfall_id: "x".into(), name: "X".into(), ..Default::default() };
        assert!(!service.card_exists("x").unwrap());
        assert!(service.insert_card(&card).unwrap());
        assert!(!service.insert_card(&card).unwrap());
        assert!(service.card_exists("x").unwrap());
    }

    #[tokio::test]
    async fn estimate_from_first_page() {
        let r = rig(FakeSource::with_pages(2, 50));
        let e = r.service().estimate(&[]).await.unwrap();
        assert_eq!(e.total_cards, 100);
        assert!((e.cost_usd - 0.2).abs() < 1e-9);
        assert_eq!(e.storage_bytes, 100 * 2048);
        assert_eq!(r.source.requested(), vec![1]);
    }
}
