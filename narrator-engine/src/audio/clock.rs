//! Clock-driven playback handle
//!
//! Tracks a play position against `tokio::time` and reports `Ended` when
//! the position reaches the clip duration. Used by the headless backends
//! and by synthetic (caption-only) playback, where there is no device
//! callback to report completion.

use crate::audio::backend::{BackendSignal, PlaybackHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How a clock handle is started
#[derive(Debug, Clone, Copy)]
pub struct ClockSpec {
    pub duration_seconds: f64,
    pub offset_seconds: f64,
    pub muted: bool,
    /// Whether `resume(Some(pos))` seeks
    pub seekable: bool,
    /// Whether `duration_seconds()` reports the duration from the start;
    /// when false the duration is only revealed by `announce_duration`
    pub duration_known: bool,
}

#[derive(Debug)]
struct ClockState {
    duration: f64,
    /// Position at `anchor` (or current position while paused)
    position: f64,
    /// Set while running
    anchor: Option<Instant>,
    timer: Option<CancellationToken>,
    generation: u64,
    finished: bool,
}

impl ClockState {
    fn current_position(&self, now: Instant) -> f64 {
        let running = self
            .anchor
            .map(|a| now.saturating_duration_since(a).as_secs_f64())
            .unwrap_or(0.0);
        (self.position + running).min(self.duration)
    }
}

/// Playback handle whose completion is driven by a timer
pub struct ClockHandle {
    state: Arc<Mutex<ClockState>>,
    signals: mpsc::UnboundedSender<BackendSignal>,
    muted: AtomicBool,
    seekable: bool,
    duration_known: AtomicBool,
}

impl ClockHandle {
    /// Start the clock at `spec.offset_seconds`
    pub fn start(spec: ClockSpec) -> (Arc<Self>, mpsc::UnboundedReceiver<BackendSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let duration = spec.duration_seconds.max(0.0);
        let handle = Arc::new(Self {
            state: Arc::new(Mutex::new(ClockState {
                duration,
                position: spec.offset_seconds.clamp(0.0, duration),
                anchor: None,
                timer: None,
                generation: 0,
                finished: false,
            })),
            signals: tx,
            muted: AtomicBool::new(spec.muted),
            seekable: spec.seekable,
            duration_known: AtomicBool::new(spec.duration_known),
        });
        handle.run();
        (handle, rx)
    }

    /// Reveal the duration and send `DurationKnown` (late metadata)
    pub fn announce_duration(&self) {
        if !self.duration_known.swap(true, Ordering::SeqCst) {
            let duration = self.lock().duration;
            let _ = self.signals.send(BackendSignal::DurationKnown(duration));
        }
    }

    /// Current play position
    pub fn position_seconds(&self) -> f64 {
        self.lock().current_position(Instant::now())
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.lock().anchor.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Anchor the clock at now and arm the end timer
    fn run(&self) {
        let mut state = self.lock();
        if state.finished || state.anchor.is_some() {
            return;
        }
        let now = Instant::now();
        state.anchor = Some(now);
        state.generation += 1;
        let generation = state.generation;
        let remaining = Duration::from_secs_f64((state.duration - state.position).max(0.0));
        let token = CancellationToken::new();
        state.timer = Some(token.clone());
        drop(state);

        let shared = Arc::clone(&self.state);
        let signals = self.signals.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(now + remaining) => {
                    let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                    if state.generation == generation && !state.finished {
                        state.finished = true;
                        state.position = state.duration;
                        state.anchor = None;
                        state.timer = None;
                        drop(state);
                        let _ = signals.send(BackendSignal::Ended);
                    }
                }
            }
        });
    }
}

impl PlaybackHandle for ClockHandle {
    fn duration_seconds(&self) -> Option<f64> {
        if self.duration_known.load(Ordering::SeqCst) {
            Some(self.lock().duration)
        } else {
            None
        }
    }

    fn supports_seek(&self) -> bool {
        self.seekable
    }

    fn pause(&self) {
        let mut state = self.lock();
        if let Some(anchor) = state.anchor.take() {
            let now = Instant::now();
            state.position =
                (state.position + now.saturating_duration_since(anchor).as_secs_f64()).min(state.duration);
            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            debug!("Clock paused at {:.3}s", state.position);
        }
    }

    fn resume(&self, from_seconds: Option<f64>) {
        {
            let mut state = self.lock();
            if state.finished || state.anchor.is_some() {
                return;
            }
            if let (true, Some(pos)) = (self.seekable, from_seconds) {
                state.position = pos.clamp(0.0, state.duration);
            }
        }
        self.run();
    }

    fn stop(&self) {
        let mut state = self.lock();
        state.finished = true;
        state.anchor = None;
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}
