//! Caption scheduling
//!
//! Captions are revealed sentence by sentence while a narration plays.
//! The clip duration is split across sentences by word count, and one
//! timer task per batch walks the resulting table.
//!
//! # Invariants
//!
//! - The caption cursor only moves forward (`fetch_max`), across batches
//!   and sessions.
//! - Per-sentence intervals are whole milliseconds summing exactly to the
//!   batch duration.
//! - `CaptionsDone` is emitted at most once per batch.

use crate::playback::types::CaptionLine;
use narrator_common::events::{EventBus, NarrationEvent};
use narrator_common::time;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Monotonic count of captions revealed
#[derive(Debug, Clone, Default)]
pub struct CaptionCursor(Arc<AtomicUsize>);

impl CaptionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Move the cursor to `index` if that is forward; returns whether it moved
    pub fn advance_to(&self, index: usize) -> bool {
        self.0.fetch_max(index, Ordering::SeqCst) < index
    }
}

/// Narration length estimate from word count
///
/// `max(min_seconds, words / words_per_second)`
pub fn estimate_duration_seconds(text: &str, words_per_second: f64, min_seconds: f64) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words / words_per_second).max(min_seconds)
}

/// Split `total_ms` across sentences weighted by word count
///
/// Each sentence weighs `max(1, words)`. Uses largest-remainder rounding
/// so the intervals sum to `total_ms` exactly.
pub fn weighted_intervals_ms(total_ms: u64, sentences: &[CaptionLine]) -> Vec<u64> {
    if sentences.is_empty() {
        return Vec::new();
    }
    let weights: Vec<u128> = sentences
        .iter()
        .map(|s| s.word_count().max(1) as u128)
        .collect();
    let total_weight: u128 = weights.iter().sum();
    let total = total_ms as u128;

    let mut intervals: Vec<u64> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(u128, usize)> = Vec::with_capacity(weights.len());
    for (i, w) in weights.iter().enumerate() {
        let scaled = total * w;
        intervals.push((scaled / total_weight) as u64);
        remainders.push((scaled % total_weight, i));
    }

    let assigned: u64 = intervals.iter().sum();
    let mut leftover = total_ms - assigned;
    // Largest remainder first; earlier sentence wins ties
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders {
        if leftover == 0 {
            break;
        }
        intervals[i] += 1;
        leftover -= 1;
    }
    intervals
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CaptionTiming {
    /// Milliseconds from the start of the batch span
    fire_at_ms: u64,
    /// Cursor value after this reveal
    index: usize,
}

fn build_table(total_ms: u64, sentences: &[CaptionLine], start_index: usize) -> Vec<CaptionTiming> {
    let mut fire_at_ms = 0;
    weighted_intervals_ms(total_ms, sentences)
        .into_iter()
        .enumerate()
        .map(|(i, interval)| {
            fire_at_ms += interval;
            CaptionTiming {
                fire_at_ms,
                index: start_index + i + 1,
            }
        })
        .collect()
}

struct BatchState {
    table: Vec<CaptionTiming>,
    /// Next table entry to fire
    next: usize,
    done: bool,
    /// Bumped whenever the driving task is replaced or the batch ends
    generation: u64,
    timer: CancellationToken,
}

struct Batch {
    session_id: Uuid,
    sentences: Vec<CaptionLine>,
    start_index: usize,
    /// Instant corresponding to `fire_at_ms == 0`
    origin: Instant,
    corrected: bool,
    state: Arc<Mutex<BatchState>>,
}

/// Fire table entries `[state.next, upto)`
fn fire_until(
    state: &mut BatchState,
    upto: usize,
    session_id: Uuid,
    bus: &EventBus,
    cursor: &CaptionCursor,
) {
    let upto = upto.min(state.table.len());
    while state.next < upto {
        let entry = state.table[state.next];
        state.next += 1;
        if cursor.advance_to(entry.index) {
            bus.emit_lossy(NarrationEvent::CaptionAdvanced {
                session_id,
                index: entry.index,
                timestamp: time::now(),
            });
        }
    }
    if state.next == state.table.len() && !state.done {
        state.done = true;
        bus.emit_lossy(NarrationEvent::CaptionsDone {
            session_id,
            index: cursor.get(),
            timestamp: time::now(),
        });
    }
}

fn lock_state(state: &Mutex<BatchState>) -> MutexGuard<'_, BatchState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Reveals captions on a timer
pub struct CaptionScheduler {
    bus: EventBus,
    cursor: CaptionCursor,
    current: Mutex<Option<Batch>>,
}

impl CaptionScheduler {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            cursor: CaptionCursor::new(),
            current: Mutex::new(None),
        }
    }

    pub fn cursor(&self) -> &CaptionCursor {
        &self.cursor
    }

    /// Whether a batch is pending
    pub fn is_active(&self) -> bool {
        self.lock_current().is_some()
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Batch>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule `sentences` across `duration_seconds` starting now
    pub fn schedule(
        &self,
        session_id: Uuid,
        duration_seconds: f64,
        sentences: &[CaptionLine],
        start_index: usize,
    ) {
        self.schedule_from(session_id, duration_seconds, sentences, start_index, 0.0);
    }

    /// Schedule a batch whose span started `offset_seconds` ago
    ///
    /// Entries already past the offset fire immediately.
    pub fn schedule_from(
        &self,
        session_id: Uuid,
        duration_seconds: f64,
        sentences: &[CaptionLine],
        start_index: usize,
        offset_seconds: f64,
    ) {
        let mut current = self.lock_current();
        if let Some(old) = current.take() {
            Self::stop_batch(&old);
        }
        if sentences.is_empty() {
            return;
        }

        let total_ms = time::seconds_to_millis(duration_seconds);
        let offset = time::seconds_to_duration(offset_seconds);
        let now = Instant::now();
        let origin = now.checked_sub(offset).unwrap_or(now);

        let table = build_table(total_ms, sentences, start_index);
        debug!(
            "Scheduling {} captions over {}ms from index {} (offset {}ms)",
            table.len(),
            total_ms,
            start_index,
            offset.as_millis()
        );

        let timer = CancellationToken::new();
        let state = Arc::new(Mutex::new(BatchState {
            table,
            next: 0,
            done: false,
            generation: 0,
            timer: timer.clone(),
        }));

        let batch = Batch {
            session_id,
            sentences: sentences.to_vec(),
            start_index,
            origin,
            corrected: false,
            state,
        };
        self.spawn_driver(&batch, 0, timer);
        *current = Some(batch);
    }

    /// Re-time the current batch with an authoritative span duration
    ///
    /// Applies once per batch; reveals already made are kept. Returns
    /// whether the batch was re-armed.
    pub fn correct_duration(&self, duration_seconds: f64) -> bool {
        let mut current = self.lock_current();
        let Some(batch) = current.as_mut() else {
            return false;
        };
        if batch.corrected {
            return false;
        }
        batch.corrected = true;

        let total_ms = time::seconds_to_millis(duration_seconds);
        let (generation, timer) = {
            let mut state = lock_state(&batch.state);
            if state.done {
                return false;
            }
            state.timer.cancel();
            state.generation += 1;
            state.table = build_table(total_ms, &batch.sentences, batch.start_index);
            state.timer = CancellationToken::new();
            (state.generation, state.timer.clone())
        };
        debug!("Caption batch re-timed to {}ms", total_ms);
        self.spawn_driver(batch, generation, timer);
        true
    }

    /// Drop the pending batch; the cursor keeps its position
    pub fn cancel(&self) {
        if let Some(batch) = self.lock_current().take() {
            Self::stop_batch(&batch);
        }
    }

    /// Reveal everything left in the batch now
    pub fn complete(&self) {
        let Some(batch) = self.lock_current().take() else {
            return;
        };
        let mut state = lock_state(&batch.state);
        state.timer.cancel();
        state.generation += 1;
        let len = state.table.len();
        fire_until(&mut state, len, batch.session_id, &self.bus, &self.cursor);
    }

    fn stop_batch(batch: &Batch) {
        let mut state = lock_state(&batch.state);
        state.timer.cancel();
        state.generation += 1;
    }

    fn spawn_driver(&self, batch: &Batch, generation: u64, timer: CancellationToken) {
        let shared = Arc::clone(&batch.state);
        let origin = batch.origin;
        let session_id = batch.session_id;
        let bus = self.bus.clone();
        let cursor = self.cursor.clone();

        tokio::spawn(async move {
            loop {
                let (slot, fire_at_ms) = {
                    let state = lock_state(&shared);
                    if state.generation != generation || state.next >= state.table.len() {
                        return;
                    }
                    (state.next, state.table[state.next].fire_at_ms)
                };

                tokio::select! {
                    _ = timer.cancelled() => return,
                    _ = tokio::time::sleep_until(origin + Duration::from_millis(fire_at_ms)) => {}
                }

                {
                    let mut state = lock_state(&shared);
                    if state.generation != generation || state.next != slot {
                        return;
                    }
                    fire_until(&mut state, slot + 1, session_id, &bus, &cursor);
                }
            }
        });
    }
}
