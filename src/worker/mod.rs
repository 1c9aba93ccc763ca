//! Stage workers: one streaming generation per part of a request.
//!
//! A worker owns no shared state beyond the event sink and the per-part
//! buffer map under its single mutex. Worker failure is never fatal to the
//! request; siblings keep streaming.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::StageCache;
use crate::events::{EventPayload, EventSender, StagePart};
use crate::provider::{GenerationConfig, TextProvider, TokenUsage};

/// Shared accumulation map: part → full text so far.
pub type PartBuffers = Arc<Mutex<HashMap<StagePart, String>>>;

/// One stage's work order.
#[derive(Debug, Clone)]
pub struct StageJob {
    pub part: StagePart,
    pub prompt: String,
    /// Stage sub-key (`<context-md5>_<part>`).
    pub cache_key: String,
}

/// What one worker produced, read by the orchestrator after fan-in.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub part: StagePart,
    pub text: String,
    pub prompt: String,
    pub cache_hit: bool,
    pub cancelled: bool,
    pub usage: TokenUsage,
    pub error: Option<String>,
}

impl StageOutcome {
    fn new(job: &StageJob) -> Self {
        Self {
            part: job.part,
            text: String::new(),
            prompt: job.prompt.clone(),
            cache_hit: false,
            cancelled: false,
            usage: TokenUsage::default(),
            error: None,
        }
    }

    /// A stage is usable when it produced any text without being cancelled.
    pub fn is_usable(&self) -> bool {
        !self.text.is_empty() && !self.cancelled
    }
}

fn record(buffers: &PartBuffers, part: StagePart, text: &str) {
    buffers.lock().entry(part).or_default().push_str(text);
}

/// Runs one stage to completion.
///
/// Cache hit: one synthetic `chunk` event carrying the whole cached text,
/// so clients and the accumulator see the same stream shape either way.
/// Miss: stream from the provider, emitting and buffering each chunk, and
/// write the buffer back to the stage cache on clean completion.
pub async fn run_stage<P: TextProvider + ?Sized>(
    provider: Arc<P>,
    stage_cache: Arc<StageCache>,
    job: StageJob,
    sink: EventSender,
    buffers: PartBuffers,
    cancel: CancellationToken,
) -> StageOutcome {
    let mut outcome = StageOutcome::new(&job);

    if let Some(cached) = stage_cache.get(&job.cache_key) {
        debug!(part = %job.part, "stage cache hit");
        record(&buffers, job.part, &cached);
        sink.send(EventPayload::Chunk {
            part: job.part,
            chunk: cached.clone(),
        })
        .await;
        outcome.text = cached;
        outcome.cache_hit = true;
        return outcome;
    }

    let mut stream = match provider
        .generate_stream(&job.prompt, &GenerationConfig::default())
        .await
    {
        Ok(stream) => stream,
        Err(e) => {
            warn!(part = %job.part, error = %e, "stage stream failed to open");
            let message = e.to_string();
            sink.send(EventPayload::Error {
                part: Some(job.part),
                error: message.clone(),
            })
            .await;
            outcome.error = Some(message);
            return outcome;
        }
    };

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(part = %job.part, "stage observed cancellation");
                outcome.cancelled = true;
                return outcome;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                if let Some(meta) = chunk.usage_metadata.as_ref() {
                    outcome.usage = TokenUsage::from_metadata(meta);
                }
                let Some(text) = chunk.first_text() else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }

                record(&buffers, job.part, text);
                outcome.text.push_str(text);
                sink.send(EventPayload::Chunk {
                    part: job.part,
                    chunk: text.to_string(),
                })
                .await;
            }
            Some(Err(e)) => {
                warn!(part = %job.part, error = %e, "stage stream broke mid-response");
                let message = e.to_string();
                sink.send(EventPayload::Error {
                    part: Some(job.part),
                    error: message.clone(),
                })
                .await;
                outcome.error = Some(message);
                return outcome;
            }
            None => break,
        }
    }

    // Clean completion: make the stage replayable for the warm path.
    stage_cache.set(&job.cache_key, &outcome.text);
    debug!(part = %job.part, bytes = outcome.text.len(), "stage complete");
    outcome
}

#[cfg(test)]
mod tests;
