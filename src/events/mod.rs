//! Typed event stream between stage workers and the SSE writer.
//!
//! One request owns one bounded channel. Producers are the stage workers
//! plus the completion task; the single consumer is the HTTP writer. Events
//! are a tagged union serialized flat (`type` discriminator plus the
//! variant's fields, then `timestamp` and `event_id`).
//!
//! Sends never block a worker indefinitely: each send waits up to the
//! configured timeout, retries with a fixed backoff, and finally routes the
//! event to a dead-letter queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::warn;
use uuid::Uuid;

/// Backoff between event-send retries.
const SEND_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Dead-letter events retained for inspection; beyond this only the counter
/// grows.
const DEAD_LETTER_RETAINED: usize = 32;

/// One sub-response of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePart {
    CityData,
    GeneralPois,
    Itinerary,
    Restaurants,
    Hotels,
    Activities,
}

impl StagePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagePart::CityData => "city_data",
            StagePart::GeneralPois => "general_pois",
            StagePart::Itinerary => "itinerary",
            StagePart::Restaurants => "restaurants",
            StagePart::Hotels => "hotels",
            StagePart::Activities => "activities",
        }
    }
}

impl std::fmt::Display for StagePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `complete` payload steering the client to its results page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub url: String,
    pub route_type: String,
    pub query_params: HashMap<String, String>,
}

/// Event payload, discriminated by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Start {
        data: serde_json::Value,
    },
    Progress {
        data: serde_json::Value,
    },
    Chunk {
        part: StagePart,
        chunk: String,
    },
    IntentClassified {
        data: serde_json::Value,
    },
    SemanticContextGenerated {
        data: serde_json::Value,
    },
    PoiDetailChunk {
        part: StagePart,
        chunk: String,
    },
    Complete {
        data: serde_json::Value,
        navigation: Navigation,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        part: Option<StagePart>,
        error: String,
    },
}

impl EventPayload {
    /// Terminal events end the request: `complete`, or a part-less `error`.
    /// An `error` carrying a `part` is a stage failure and non-terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventPayload::Complete { .. } | EventPayload::Error { part: None, .. }
        )
    }
}

/// One event on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub event_id: Uuid,
}

impl StreamEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
            event_id: Uuid::new_v4(),
        }
    }
}

/// Sink for events that could not be delivered within the timeout/retry
/// budget, and for events produced after close.
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    dropped: AtomicU64,
    retained: Mutex<Vec<StreamEvent>>,
}

impl DeadLetterQueue {
    pub fn push(&self, event: StreamEvent) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        let mut retained = self.retained.lock();
        if retained.len() < DEAD_LETTER_RETAINED {
            retained.push(event);
        }
    }

    /// Total number of dropped events.
    pub fn len(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the retained head of the queue.
    pub fn retained(&self) -> Vec<StreamEvent> {
        self.retained.lock().clone()
    }
}

/// Channel sizing and delivery budget for one request.
#[derive(Debug, Clone, Copy)]
pub struct EventChannelConfig {
    pub capacity: usize,
    pub send_timeout: Duration,
    pub send_retries: u32,
}

impl Default for EventChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            send_timeout: Duration::from_secs(2),
            send_retries: 3,
        }
    }
}

/// Cloneable producer half of a request's event channel.
///
/// The logical close happens exactly once: the first caller of
/// [`EventSender::send_terminal`] wins, every later terminal attempt is a
/// no-op, and sends after close go to the dead-letter queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<StreamEvent>,
    dead_letters: Arc<DeadLetterQueue>,
    terminal_sent: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    config: EventChannelConfig,
}

/// Creates the per-request event channel.
pub fn event_channel(config: EventChannelConfig) -> (EventSender, mpsc::Receiver<StreamEvent>) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let sender = EventSender {
        tx,
        dead_letters: Arc::new(DeadLetterQueue::default()),
        terminal_sent: Arc::new(AtomicBool::new(false)),
        closed: Arc::new(AtomicBool::new(false)),
        config,
    };
    (sender, rx)
}

impl EventSender {
    /// Emits a non-terminal event. Delivery failures are routed to the
    /// dead-letter queue; the caller never blocks past the retry budget.
    pub async fn send(&self, payload: EventPayload) {
        let event = StreamEvent::new(payload);

        if self.closed.load(Ordering::Acquire) {
            self.dead_letters.push(event);
            return;
        }

        self.deliver(event).await;
    }

    /// Emits the request's terminal event and closes the channel. Returns
    /// `true` for the single caller that won the race.
    pub async fn send_terminal(&self, payload: EventPayload) -> bool {
        debug_assert!(payload.is_terminal());

        if self
            .terminal_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.deliver(StreamEvent::new(payload)).await;
        self.closed.store(true, Ordering::Release);
        true
    }

    /// Closes the channel without a terminal event (cancelled requests).
    /// Idempotent; later sends go to the dead-letter queue.
    pub fn close(&self) {
        self.terminal_sent.store(true, Ordering::Release);
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    /// Resolves when the consumer half has gone away.
    pub async fn consumer_gone(&self) {
        self.tx.closed().await;
    }

    async fn deliver(&self, event: StreamEvent) {
        let mut pending = event;

        for attempt in 0..=self.config.send_retries {
            match self.tx.send_timeout(pending, self.config.send_timeout).await {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(returned)) => {
                    pending = returned;
                    if attempt < self.config.send_retries {
                        tokio::time::sleep(SEND_RETRY_BACKOFF).await;
                    }
                }
                Err(SendTimeoutError::Closed(returned)) => {
                    // Consumer went away; no point retrying.
                    self.dead_letters.push(returned);
                    return;
                }
            }
        }

        warn!(
            dropped = self.dead_letters.len() + 1,
            "event channel full past retry budget, dead-lettering event"
        );
        self.dead_letters.push(pending);
    }
}
