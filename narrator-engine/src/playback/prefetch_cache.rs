//! Prefetch cache for synthesized narration audio
//!
//! Upcoming narrations are synthesized ahead of time so playback can start
//! without waiting on the TTS service. Keys are normalized (trimmed,
//! lowercased) text; concurrent requests for the same key share a single
//! synthesis.
//!
//! Bounded with least-recently-used eviction by access order.

use crate::audio::AudioPayload;
use crate::error::{Error, Result};
use crate::playback::types::CacheStats;
use crate::tts::SpeechSynthesizer;
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of one synthesis, shared by every waiter
type FetchResult = std::result::Result<Option<AudioPayload>, String>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Cache key for `text`
pub fn normalize_key(text: &str) -> String {
    text.trim().to_lowercase()
}

#[derive(Debug)]
struct CacheEntry {
    payload: AudioPayload,
    last_accessed: Instant,
}

struct InFlight {
    id: u64,
    fetch: SharedFetch,
    cancel: CancellationToken,
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    in_flight: HashMap<String, InFlight>,
    next_fetch_id: u64,
}

impl CacheInner {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            in_flight: HashMap::new(),
            next_fetch_id: 0,
        }
    }

    fn touch(&mut self, key: &str) -> Option<AudioPayload> {
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        Some(entry.payload.clone())
    }

    /// Insert and return the number of evicted entries
    fn insert(&mut self, key: String, payload: AudioPayload) -> u64 {
        let entry = CacheEntry {
            payload,
            last_accessed: Instant::now(),
        };
        match self.entries.push(key.clone(), entry) {
            // Same key: the old value was replaced, nothing evicted
            Some((old_key, _)) if old_key == key => 0,
            Some((old_key, old)) => {
                debug!(
                    "Evicted cached narration '{}' (idle {:?})",
                    old_key,
                    old.last_accessed.elapsed()
                );
                1
            }
            None => 0,
        }
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

pub struct PrefetchCache {
    capacity: NonZeroUsize,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    inner: Arc<Mutex<CacheInner>>,
    counters: Arc<CacheCounters>,
}

fn lock_inner(inner: &Mutex<CacheInner>) -> MutexGuard<'_, CacheInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl PrefetchCache {
    pub fn new(capacity: usize, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity,
            synthesizer,
            inner: Arc::new(Mutex::new(CacheInner::new(capacity))),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Cached audio for `text`, without fetching
    pub fn get(&self, text: &str) -> Option<AudioPayload> {
        let key = normalize_key(text);
        let hit = lock_inner(&self.inner).touch(&key);
        match hit {
            Some(_) => self.counters.hits.fetch_add(1, Ordering::Relaxed),
            None => self.counters.misses.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Store audio for `text`
    pub fn set(&self, text: &str, payload: AudioPayload) {
        let key = normalize_key(text);
        let evicted = lock_inner(&self.inner).insert(key, payload);
        self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Start synthesizing `text` in the background
    ///
    /// Does nothing when the text is cached or already being fetched.
    /// Failures are logged and dropped.
    pub fn prefetch(&self, text: &str) {
        let key = normalize_key(text);
        if key.is_empty() {
            return;
        }
        let mut inner = lock_inner(&self.inner);
        if inner.entries.contains(&key) || inner.in_flight.contains_key(&key) {
            return;
        }
        let _ = self.begin_fetch(&mut inner, key, text);
    }

    /// Abandon an in-flight prefetch of `text`
    ///
    /// Returns whether a fetch was cancelled.
    pub fn cancel_prefetch(&self, text: &str) -> bool {
        let key = normalize_key(text);
        match lock_inner(&self.inner).in_flight.remove(&key) {
            Some(flight) => {
                flight.cancel.cancel();
                debug!("Cancelled prefetch of '{}'", key);
                true
            }
            None => false,
        }
    }

    /// Drop every entry and cancel in-flight fetches
    pub fn clear(&self) {
        let mut inner = lock_inner(&self.inner);
        inner.entries.clear();
        for (_, flight) in inner.in_flight.drain() {
            flight.cancel.cancel();
        }
    }

    /// Audio for `text`: cache, then an in-flight fetch, then a new synthesis
    ///
    /// # Errors
    /// `Error::Network` when synthesis fails.
    pub async fn fetch(&self, text: &str) -> Result<Option<AudioPayload>> {
        if let Some(payload) = self.get(text) {
            return Ok(Some(payload));
        }
        let key = normalize_key(text);
        if key.is_empty() {
            return Ok(None);
        }

        let fetch = {
            let mut inner = lock_inner(&self.inner);
            match inner.in_flight.get(&key) {
                Some(flight) => {
                    debug!("Joining in-flight synthesis of '{}'", key);
                    flight.fetch.clone()
                }
                None => self.begin_fetch(&mut inner, key, text),
            }
        };
        fetch.await.map_err(Error::Network)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock_inner(&self.inner);
        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity.get(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            in_flight: inner.in_flight.len(),
        }
    }

    /// Register a shared synthesis for `key`; caller holds the lock
    ///
    /// The synthesis runs on its own task, so it finishes and leaves the
    /// in-flight table even when every waiter goes away.
    fn begin_fetch(&self, inner: &mut CacheInner, key: String, text: &str) -> SharedFetch {
        inner.next_fetch_id += 1;
        let id = inner.next_fetch_id;
        let cancel = CancellationToken::new();

        let synthesizer = Arc::clone(&self.synthesizer);
        let shared_inner = Arc::clone(&self.inner);
        let counters = Arc::clone(&self.counters);
        let token = cancel.clone();
        let owned_text = text.to_string();
        let owned_key = key.clone();

        let fetch = async move {
            let result = tokio::select! {
                _ = token.cancelled() => Ok(None),
                result = synthesizer.synthesize(&owned_text) => result,
            };

            let mut inner = lock_inner(&shared_inner);
            if inner.in_flight.get(&owned_key).map(|f| f.id) == Some(id) {
                inner.in_flight.remove(&owned_key);
            }
            match result {
                Ok(Some(payload)) if !token.is_cancelled() => {
                    let evicted = inner.insert(owned_key, payload.clone());
                    counters.evictions.fetch_add(evicted, Ordering::Relaxed);
                    Ok(Some(payload))
                }
                Ok(_) => Ok(None),
                Err(e) => {
                    warn!("Synthesis failed for '{}': {}", owned_key, e);
                    Err(e.to_string())
                }
            }
        }
        .boxed()
        .shared();

        debug!("Starting synthesis of '{}'", key);
        let driver = fetch.clone();
        tokio::spawn(async move {
            let _ = driver.await;
        });
        inner.in_flight.insert(
            key,
            InFlight {
                id,
                fetch: fetch.clone(),
                cancel,
            },
        );
        fetch
    }
}
