pub mod interpret;
pub mod openai;
pub mod prompt;
pub mod rules;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::GenerationError;
use crate::model::{CardRecord, EffectSet};
use crate::ratelimit::RateLimiter;
use interpret::Interpretation;
pub use openai::{OpenAiGenerator, TextGenerator};

/// Result of enriching one card.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub effects: EffectSet,
    /// Raw generator output, when the generator answered at all.
    pub raw_response: Option<String>,
    pub elapsed: Duration,
}

/// Three tiers: generator JSON → text scan of the reply → rules on the card.
pub struct EffectEnricher {
    generator: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl EffectEnricher {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        EffectEnricher {
            generator,
            limiter,
            timeout,
            retry,
        }
    }

    /// Always returns a usable effect set.
    pub async fn generate_effects(&self, card: &CardRecord) -> Enrichment {
        let start = Instant::now();

        let (effects, raw_response) = match self.call_with_retry(card).await {
            Ok(text) => {
                let effects = match interpret::interpret_response(&text) {
                    Interpretation::Structured(e) | Interpretation::TextAnalysis(e) => e,
                    Interpretation::Unusable => {
                        debug!("Unusable generator reply for {}, using rules", card.name);
                        rules::fallback_effects(card)
                    }
                };
                (effects, Some(text))
            }
            Err(e) => {
                warn!("Generation failed for {}: {}", card.name, e);
                (rules::fallback_effects(card), None)
            }
        };

        debug!("Enriched {} via {}", card.name, effects.tier);
        Enrichment {
            effects,
            raw_response,
            elapsed: start.elapsed(),
        }
    }

    async fn call_with_retry(&self, card: &CardRecord) -> Result<String, GenerationError> {
        let prompt = prompt::build_prompt(card);
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;
            let result = match tokio::time::timeout(
                self.timeout,
                self.generator.generate(prompt::SYSTEM_PROMPT, &prompt),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(GenerationError::Timeout),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let backoff = self.retry.delay(attempt);
                    warn!(
                        "Generation for {} failed (attempt {}/{}): {}, backing off {:.1}s",
                        card.name,
                        attempt + 1,
                        self.retry.max_retries,
                        e,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Replays scripted replies in order; repeats the last one when exhausted.
    pub struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String, GenerationError>>>,
        last: Mutex<Option<Result<String, ()>>>,
        pub calls: AtomicUsize,
        pub delay: Duration,
        in_flight: AtomicUsize,
        /// Most calls ever running at once.
        pub peak: AtomicUsize,
    }

    impl ScriptedGenerator {
        pub fn new(replies: Vec<Result<String, GenerationError>>) -> Self {
            ScriptedGenerator {
                replies: Mutex::new(replies.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        pub fn always(reply: &str) -> Self {
            Self::new(vec![Ok(reply.to_string())])
        }

        pub fn failing() -> Self {
            Self::new(vec![Err(GenerationError::MissingApiKey)])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(reply) => {
                    *self.last.lock().unwrap() = Some(match &reply {
                        Ok(s) => Ok(s.clone()),
                        Err(_) => Err(()),
                    });
                    reply
                }
                None => match self.last.lock().unwrap().clone() {
                    Some(Ok(s)) => Ok(s),
                    _ => Err(GenerationError::MissingApiKey),
                },
            }
        }
    }

    pub fn enricher(generator: Arc<dyn TextGenerator>) -> EffectEnricher {
        EffectEnricher::new(
            generator,
            Arc::new(RateLimiter::unlimited()),
            Duration::from_secs(5),
            RetryPolicy { max_retries: 2, base_backoff: Duration::from_millis(1) },
        )
    }
}
