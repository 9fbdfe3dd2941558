//! Control operations and diagnostics
//!
//! **Responsibilities:**
//! - pause / resume / stop of the active session
//! - Mute and user-gesture handling
//! - Read-only snapshot and accessors

use super::core::NarrationEngine;
use crate::playback::prefetch_cache::PrefetchCache;
use crate::playback::types::EngineSnapshot;
use narrator_common::events::{EndReason, EventBus, NarrationEvent, SessionState};
use narrator_common::time;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

impl NarrationEngine {
    /// Pause the playing session
    ///
    /// Returns false when nothing is playing (including a session that is
    /// still loading).
    pub async fn pause(&self) -> bool {
        let inner = &self.inner;
        let mut guard = inner.active.lock().await;
        let Some(active) = guard.as_mut() else {
            return false;
        };

        let handle = active.handle.clone();
        if !inner
            .pause_resume
            .pause(&mut active.session, handle.as_deref(), &inner.parts())
        {
            return false;
        }
        let session_id = active.session.id;
        drop(guard);

        info!("Narration {} paused", session_id);
        inner.emit_state_change(session_id, SessionState::Playing, SessionState::Paused);
        true
    }

    /// Resume a paused session
    ///
    /// Returns false when nothing is paused.
    pub async fn resume(&self) -> bool {
        let inner = &self.inner;
        let mut guard = inner.active.lock().await;
        let Some(active) = guard.as_mut() else {
            return false;
        };

        let handle = active.handle.clone();
        let Some(remaining) =
            inner
                .pause_resume
                .resume(&mut active.session, handle.as_deref(), &inner.parts())
        else {
            return false;
        };
        active.caption_origin = active.session.elapsed_seconds;
        let session_id = active.session.id;
        drop(guard);

        info!(
            "Narration {} resumed ({:.3}s remaining)",
            session_id, remaining
        );
        inner.emit_state_change(session_id, SessionState::Paused, SessionState::Playing);
        true
    }

    /// Abort the active session, including one still loading
    ///
    /// Returns false when there was nothing to stop.
    pub async fn stop(&self) -> bool {
        let inner = &self.inner;
        let current = inner.active.lock().await.as_ref().map(|a| a.session.id);
        match current {
            Some(session_id) => inner.finish(session_id, EndReason::Stopped).await.is_some(),
            None => false,
        }
    }

    /// Mute or unmute narration audio
    ///
    /// Applies to the live handle now and to any handle started later.
    pub async fn set_muted(&self, muted: bool) {
        let inner = &self.inner;
        let was = inner.muted.swap(muted, Ordering::SeqCst);

        if let Some(handle) = inner
            .active
            .lock()
            .await
            .as_ref()
            .and_then(|a| a.handle_ref())
        {
            handle.set_muted(muted);
        }

        if was != muted {
            debug!("Narration muted: {}", muted);
            inner.bus.emit_lossy(NarrationEvent::MuteChanged {
                muted,
                timestamp: time::now(),
            });
        }
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }

    /// Record a user gesture and unlock every backend
    ///
    /// Resumes a suspended decode context and grants element playback.
    pub async fn notify_user_gesture(&self) {
        let inner = &self.inner;
        inner.gesture_fresh.store(true, Ordering::SeqCst);
        for backend in &inner.backends {
            if let Err(e) = backend.unlock().await {
                debug!("{} unlock on gesture failed: {}", backend.kind(), e);
            }
        }
        debug!(
            "User gesture recorded (decode context running: {})",
            inner.decode_context_running()
        );
    }

    /// Read-only engine state for diagnostics
    pub async fn snapshot(&self) -> EngineSnapshot {
        let inner = &self.inner;
        let session = inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| a.session.snapshot(Instant::now()));

        EngineSnapshot {
            session,
            caption_cursor: inner.captions.cursor().get(),
            muted: inner.muted.load(Ordering::SeqCst),
            decode_context_running: inner.decode_context_running(),
            watchdog_interventions: inner.interventions.load(Ordering::SeqCst),
            cache: inner.cache.stats(),
        }
    }

    /// Prefetch cache shared with the engine
    pub fn cache(&self) -> &Arc<PrefetchCache> {
        &self.inner.cache
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.inner.bus.subscribe()
    }

    /// Current caption cursor
    pub fn caption_cursor(&self) -> usize {
        self.inner.captions.cursor().get()
    }

    /// Watchdog interventions since startup
    pub fn watchdog_interventions(&self) -> u64 {
        self.inner.interventions.load(Ordering::SeqCst)
    }
}
