//! Ambient video coordination
//!
//! The looping background video follows the narration: it plays while a
//! session is `Playing` and pauses otherwise. Starting may fail
//! transiently (autoplay policy, still loading), so starts are retried
//! with doubling backoff. Video problems never affect narration.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ambient video surface
#[async_trait]
pub trait VideoOutput: Send + Sync {
    /// Start (or continue) looping playback
    async fn play(&self) -> Result<()>;

    fn pause(&self);
}

/// Video output for deployments without a video surface
#[derive(Debug, Default)]
pub struct NullVideoOutput;

#[async_trait]
impl VideoOutput for NullVideoOutput {
    async fn play(&self) -> Result<()> {
        Ok(())
    }

    fn pause(&self) {}
}

pub struct AuxiliaryVideoCoordinator {
    output: Arc<dyn VideoOutput>,
    attempts: u32,
    base_delay: Duration,
    retry: Mutex<Option<CancellationToken>>,
    playing: Arc<AtomicBool>,
    /// Bumped by every `start`; a start only acts while it is the latest
    generation: Arc<AtomicU64>,
}

impl AuxiliaryVideoCoordinator {
    pub fn new(output: Arc<dyn VideoOutput>, attempts: u32, base_delay: Duration) -> Self {
        Self {
            output,
            attempts: attempts.max(1),
            base_delay,
            retry: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn replace_retry(&self, next: Option<CancellationToken>) {
        let mut retry = self.retry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = retry.take() {
            old.cancel();
        }
        *retry = next;
    }

    /// Start playback in the background, retrying on failure
    pub fn start(&self) {
        let token = CancellationToken::new();
        self.replace_retry(Some(token.clone()));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let output = Arc::clone(&self.output);
        let playing = Arc::clone(&self.playing);
        let latest = Arc::clone(&self.generation);
        let attempts = self.attempts;
        let base_delay = self.base_delay;

        tokio::spawn(async move {
            let mut delay = base_delay;
            for attempt in 1..=attempts {
                if token.is_cancelled() {
                    return;
                }
                match output.play().await {
                    Ok(()) => {
                        if token.is_cancelled() {
                            // Paused while the start was in flight; a newer
                            // start owns the output if there is one
                            if latest.load(Ordering::SeqCst) == generation {
                                output.pause();
                            }
                            return;
                        }
                        playing.store(true, Ordering::SeqCst);
                        debug!("Ambient video playing (attempt {})", attempt);
                        return;
                    }
                    Err(e) if attempt == attempts => {
                        warn!("Ambient video failed to start after {} attempts: {}", attempts, e);
                        return;
                    }
                    Err(e) => {
                        debug!("Ambient video start attempt {} failed: {}", attempt, e);
                    }
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay *= 2;
            }
        });
    }

    /// Pause now and cancel pending retries
    pub fn pause(&self) {
        self.replace_retry(None);
        self.playing.store(false, Ordering::SeqCst);
        self.output.pause();
    }
}
