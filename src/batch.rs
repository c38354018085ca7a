use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::db::Persister;
use crate::enrich::{EffectEnricher, Enrichment};
use crate::model::{CardRecord, EffectSet};
use crate::normalize::normalize_page;

/// Counts for one batch. Only `persisted` advances the progress record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub persisted: u64,
    /// Already stored, dropped by dedup.
    pub skipped: u64,
    /// Malformed records plus persistence failures.
    pub failed: u64,
    pub last_name: Option<String>,
}

// ── Dedup ──

/// Drops records whose id is already stored.
pub struct Deduplicator {
    persister: Arc<dyn Persister>,
}

impl Deduplicator {
    pub fn new(persister: Arc<dyn Persister>) -> Self {
        Deduplicator { persister }
    }

    /// Returns `(new records, skipped count)`. A failed lookup keeps the
    /// record; the insert is idempotent anyway.
    pub fn filter_new(&self, cards: Vec<CardRecord>) -> (Vec<CardRecord>, u64) {
        let mut skipped = 0;
        let fresh = cards
            .into_iter()
            .filter(|card| match self.persister.exists(&card.scryfall_id) {
                Ok(true) => {
                    skipped += 1;
                    false
                }
                Ok(false) => true,
                Err(e) => {
                    warn!("Existence check failed for {}: {:#}", card.name, e);
                    true
                }
            })
            .collect();
        (fresh, skipped)
    }
}

// ── Batch ──

/// Normalize → dedup → enrich → persist for one slice of raw records.
pub struct BatchProcessor {
    persister: Arc<dyn Persister>,
    dedup: Deduplicator,
    enricher: Arc<EffectEnricher>,
    concurrency: usize,
}

impl BatchProcessor {
    pub fn new(
        persister: Arc<dyn Persister>,
        enricher: Arc<EffectEnricher>,
        concurrency: usize,
    ) -> Self {
        BatchProcessor {
            dedup: Deduplicator::new(Arc::clone(&persister)),
            persister,
            enricher,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run_batch(&self, raw: &[Value], enrich: bool) -> BatchOutcome {
        let page = normalize_page(raw);
        let last_name = page.cards.last().map(|c| c.name.clone());
        let (fresh, skipped) = self.dedup.filter_new(page.cards);

        let mut outcome = BatchOutcome {
            skipped,
            failed: page.malformed as u64,
            last_name,
            ..Default::default()
        };

        if fresh.is_empty() {
            debug!("Batch of {} had nothing new", raw.len());
            return outcome;
        }

        if enrich {
            self.enrich_and_persist(fresh, &mut outcome).await;
        } else {
            for mut card in fresh {
                card.effects = EffectSet::skipped();
                self.persist(&card, None, &mut outcome);
            }
        }

        info!(
            "Batch done: {} persisted, {} skipped, {} failed",
            outcome.persisted, outcome.skipped, outcome.failed
        );
        outcome
    }

    /// Enrich on a bounded pool, persisting each card as its result arrives.
    async fn enrich_and_persist(&self, cards: Vec<CardRecord>, outcome: &mut BatchOutcome) {
        let expected = cards.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel::<(CardRecord, Enrichment)>(self.concurrency * 2);

        for card in cards {
            let enricher = Arc::clone(&self.enricher);
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return;
                };
                let enrichment = enricher.generate_effects(&card).await;
                let _ = tx.send((card, enrichment)).await;
            });
        }

        // rx closes once every task has sent or died
        drop(tx);

        let mut received = 0;
        while let Some((mut card, enrichment)) = rx.recv().await {
            received += 1;
            card.effects = enrichment.effects.clone();
            self.persist(&card, Some(&enrichment), outcome);
        }

        if received < expected {
            let lost = (expected - received) as u64;
            warn!("{} enrichment tasks ended without a result", lost);
            outcome.failed += lost;
        }
    }

    fn persist(&self, card: &CardRecord, enrichment: Option<&Enrichment>, outcome: &mut BatchOutcome) {
        match self.persister.upsert(card) {
            Ok(inserted) => {
                if inserted {
                    outcome.persisted += 1;
                } else {
                    // Raced with another writer; already stored.
                    outcome.skipped += 1;
                }
                if let Some(e) = enrichment {
                    let elapsed_ms = e.elapsed.as_millis() as i64;
                    if let Err(err) =
                        self.persister
                            .record_generation(card, e.raw_response.as_deref(), elapsed_ms)
                    {
                        warn!("Failed to log generation for {}: {:#}", card.name, err);
                    }
                }
            }
            Err(e) => {
                warn!("Failed to persist {} ({}): {:#}", card.name, card.scryfall_id, e);
                outcome.failed += 1;
            }
        }
    }
}
