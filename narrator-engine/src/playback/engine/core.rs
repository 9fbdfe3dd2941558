//! Core narration engine - construction, play and session teardown
//!
//! **Responsibilities:**
//! - NarrationEngine struct definition and builder
//! - `play`: payload resolution, backend fallback chain, session install
//! - `finish`: the single exit path for every session
//!
//! Control operations live in `control.rs`; backend signal handling and
//! the watchdog listener live in `signals.rs`.

use crate::audio::{
    AudioBackend, AudioPayload, BackendSignal, BackendStart, PlaybackHandle, StartParams,
    SyntheticBackend,
};
use crate::config::EngineSettings;
use crate::error::{Error, Result};
use crate::playback::caption_scheduler::{estimate_duration_seconds, CaptionScheduler};
use crate::playback::pause_resume::{PauseResumeController, PlaybackParts};
use crate::playback::prefetch_cache::PrefetchCache;
use crate::playback::selection::{self, SelectionInput};
use crate::playback::session::PlaybackSession;
use crate::playback::types::{NarrationRequest, PlaybackOutcome};
use crate::playback::video::{AuxiliaryVideoCoordinator, NullVideoOutput, VideoOutput};
use crate::playback::watchdog::WatchdogGuard;
use crate::tts::{NoopSynthesizer, SpeechSynthesizer};
use narrator_common::events::{BackendKind, EndReason, EventBus, NarrationEvent, SessionState};
use narrator_common::time;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The session currently owned by the engine
pub(super) struct ActiveSession {
    pub(super) session: PlaybackSession,
    /// Set once a backend has started
    pub(super) handle: Option<Arc<dyn PlaybackHandle>>,
    /// Cancels an in-flight start and the signal driver
    pub(super) cancel: CancellationToken,
    pub(super) outcome_tx: Option<oneshot::Sender<PlaybackOutcome>>,
    /// Every audio backend failed; captions run on the synthetic clock
    pub(super) degraded: bool,
    /// Session time at which the current caption batch span starts
    pub(super) caption_origin: f64,
}

impl ActiveSession {
    pub(super) fn handle_ref(&self) -> Option<&dyn PlaybackHandle> {
        self.handle.as_deref()
    }
}

/// Shared engine state
pub(super) struct EngineInner {
    pub(super) settings: EngineSettings,
    pub(super) bus: EventBus,
    pub(super) backends: Vec<Arc<dyn AudioBackend>>,
    pub(super) synthetic: SyntheticBackend,
    pub(super) cache: Arc<PrefetchCache>,
    pub(super) synthesize_on_miss: bool,
    pub(super) captions: CaptionScheduler,
    pub(super) watchdog: WatchdogGuard,
    pub(super) video: AuxiliaryVideoCoordinator,
    pub(super) pause_resume: PauseResumeController,
    pub(super) active: Mutex<Option<ActiveSession>>,
    pub(super) muted: AtomicBool,
    /// A user gesture happened since the last successful start
    pub(super) gesture_fresh: AtomicBool,
    /// Try `BufferedElement` first on the next narration
    pub(super) prefer_buffered_once: AtomicBool,
    pub(super) interventions: AtomicU64,
}

impl EngineInner {
    pub(super) fn parts(&self) -> PlaybackParts<'_> {
        PlaybackParts {
            captions: &self.captions,
            watchdog: &self.watchdog,
            video: &self.video,
        }
    }

    pub(super) fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn AudioBackend>> {
        self.backends.iter().find(|b| b.kind() == kind)
    }

    pub(super) fn decode_context_running(&self) -> bool {
        self.backend(BackendKind::StreamingDecode)
            .map(|b| b.is_available())
            .unwrap_or(false)
    }

    pub(super) fn emit_state_change(&self, session_id: Uuid, old: SessionState, new: SessionState) {
        self.bus.emit_lossy(NarrationEvent::PlaybackStateChanged {
            session_id,
            old_state: old,
            new_state: new,
            timestamp: time::now(),
        });
    }

    pub(super) fn emit_error(&self, session_id: Option<Uuid>, error: &Error, reason: String) {
        let Some(code) = error.code() else {
            warn!("Unreported narration error: {}", error);
            return;
        };
        self.bus.emit_lossy(NarrationEvent::NarrationError {
            session_id,
            code,
            reason,
            timestamp: time::now(),
        });
    }

    /// End `session_id` if it is still the active session
    ///
    /// Every way a session ends goes through here, so each session ends
    /// exactly once. Returns the outcome, or None when the session was
    /// already gone.
    pub(super) async fn finish(&self, session_id: Uuid, end_reason: EndReason) -> Option<PlaybackOutcome> {
        let mut active = {
            let mut guard = self.active.lock().await;
            if guard.as_ref().map(|a| a.session.id) != Some(session_id) {
                return None;
            }
            guard.take()?
        };

        active.cancel.cancel();
        if let Some(handle) = active.handle.take() {
            handle.stop();
        }
        self.watchdog.clear();
        match end_reason {
            EndReason::Natural | EndReason::Watchdog | EndReason::BackendFailure => {
                self.captions.complete();
            }
            EndReason::Stopped | EndReason::Superseded => self.captions.cancel(),
        }
        self.video.pause();

        let session = &mut active.session;
        session.accumulate(Instant::now());
        session.guard_deadline = None;
        let terminal = end_reason.terminal_state();
        let old_state = match session.transition(terminal) {
            Ok(old) => old,
            Err(e) => {
                warn!("Forcing session end: {}", e);
                std::mem::replace(&mut session.state, terminal)
            }
        };
        self.emit_state_change(session_id, old_state, terminal);

        let outcome = if active.degraded {
            PlaybackOutcome::degraded(session_id, end_reason)
        } else {
            PlaybackOutcome::new(session_id, session.backend, end_reason)
        };

        info!(
            "Narration {} ended: {} (completed={}, skipped={}, backend={})",
            session_id, end_reason, outcome.completed, outcome.skipped, outcome.backend
        );
        self.bus.emit_lossy(NarrationEvent::NarrationEnded {
            session_id,
            completed: outcome.completed,
            skipped: outcome.skipped,
            end_reason,
            timestamp: time::now(),
        });

        if let Some(tx) = active.outcome_tx.take() {
            let _ = tx.send(outcome);
        }
        Some(outcome)
    }
}

/// Ends a `Loading` session whose `play` future was dropped
///
/// Nothing else would end it: no backend has started, so there is no
/// watchdog deadline and no signal driver yet.
struct LoadingGuard {
    inner: Arc<EngineInner>,
    session_id: Uuid,
    cancel: CancellationToken,
    armed: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let session_id = self.session_id;
        runtime.spawn(async move {
            if inner.finish(session_id, EndReason::Stopped).await.is_some() {
                info!("Narration {} abandoned while loading", session_id);
            }
        });
    }
}

/// A backend that has started for a session
struct Started {
    kind: BackendKind,
    handle: Arc<dyn PlaybackHandle>,
    signals: mpsc::UnboundedReceiver<BackendSignal>,
    /// Duration used for scheduling, and whether the backend vouched for it
    duration_seconds: f64,
    authoritative: bool,
    degraded: bool,
}

/// Narration engine - arbitrates backends and drives one session at a time
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct NarrationEngine {
    pub(super) inner: Arc<EngineInner>,
}

/// Builder for [`NarrationEngine`]
pub struct NarrationEngineBuilder {
    settings: EngineSettings,
    backends: Vec<Arc<dyn AudioBackend>>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    synthesize_on_miss: bool,
    video: Arc<dyn VideoOutput>,
    bus: Option<EventBus>,
}

impl NarrationEngineBuilder {
    /// Add an audio backend (at most one per kind is used)
    pub fn backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Fetch audio through the cache when a request has none
    pub fn synthesize_on_miss(mut self, enabled: bool) -> Self {
        self.synthesize_on_miss = enabled;
        self
    }

    pub fn video(mut self, video: Arc<dyn VideoOutput>) -> Self {
        self.video = video;
        self
    }

    /// Share an existing event bus
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Build the engine
    ///
    /// Must be called from within a tokio runtime (spawns the watchdog
    /// listener).
    ///
    /// # Errors
    /// `Error::Config` when the settings are invalid.
    pub fn build(self) -> Result<NarrationEngine> {
        self.settings.validate()?;
        let settings = self.settings;

        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::new(settings.event_capacity));
        let (trip_tx, trip_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(EngineInner {
            backends: self.backends,
            synthetic: SyntheticBackend,
            cache: Arc::new(PrefetchCache::new(settings.cache_capacity, self.synthesizer)),
            synthesize_on_miss: self.synthesize_on_miss,
            captions: CaptionScheduler::new(bus.clone()),
            watchdog: WatchdogGuard::new(
                settings.watchdog_tolerance(),
                settings.watchdog_coalesce_window(),
                trip_tx,
            ),
            video: AuxiliaryVideoCoordinator::new(
                self.video,
                settings.video_retry_attempts,
                settings.video_retry_base_delay(),
            ),
            pause_resume: PauseResumeController::new(settings.resume_epsilon_seconds()),
            active: Mutex::new(None),
            muted: AtomicBool::new(false),
            gesture_fresh: AtomicBool::new(false),
            prefer_buffered_once: AtomicBool::new(false),
            interventions: AtomicU64::new(0),
            bus,
            settings,
        });

        super::signals::spawn_watchdog_listener(Arc::downgrade(&inner), trip_rx);

        info!(
            "Narration engine ready: backends {:?}",
            inner.backends.iter().map(|b| b.kind()).collect::<Vec<_>>()
        );
        Ok(NarrationEngine { inner })
    }
}

impl NarrationEngine {
    pub fn builder(settings: EngineSettings) -> NarrationEngineBuilder {
        NarrationEngineBuilder {
            settings,
            backends: Vec::new(),
            synthesizer: Arc::new(NoopSynthesizer),
            synthesize_on_miss: true,
            video: Arc::new(NullVideoOutput),
            bus: None,
        }
    }

    /// Play a narration and wait for it to end
    ///
    /// Any active session is superseded first. Playback problems never
    /// surface here: they fall back to another backend or to caption-only
    /// playback and are reported as `NarrationError` events.
    ///
    /// # Errors
    /// `Error::InvalidRequest` for empty text or no caption sentences.
    pub async fn play(&self, request: NarrationRequest) -> Result<PlaybackOutcome> {
        request.validate()?;

        let (session_id, cancel, outcome_rx) = self.begin(&request).await;
        let mut loading = LoadingGuard {
            inner: Arc::clone(&self.inner),
            session_id,
            cancel: cancel.clone(),
            armed: true,
        };

        let payload = self.resolve_payload(session_id, &request, &cancel).await;
        if !cancel.is_cancelled() {
            match self.start_chain(session_id, payload, &request, &cancel).await {
                Some(started) => self.install(session_id, &request, started).await,
                None => debug!("Narration {} cancelled before start", session_id),
            }
        }
        // Installed (or already ended): the watchdog and signal driver own it now
        loading.armed = false;

        // The sender only drops without an outcome if the engine is torn down
        outcome_rx
            .await
            .map_err(|_| Error::Internal(format!("narration {} ended without an outcome", session_id)))
    }

    /// Supersede any active session and register a new one in `Loading`
    async fn begin(
        &self,
        request: &NarrationRequest,
    ) -> (Uuid, CancellationToken, oneshot::Receiver<PlaybackOutcome>) {
        let inner = &self.inner;

        let previous = inner.active.lock().await.as_ref().map(|a| a.session.id);
        if let Some(previous) = previous {
            inner.finish(previous, EndReason::Superseded).await;
        }

        let mut session = PlaybackSession::new(request.sentences.clone(), request.start_index);
        let session_id = session.id;
        // Idle -> Loading is always legal
        let _ = session.transition(SessionState::Loading);

        let cancel = CancellationToken::new();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        {
            let mut active = inner.active.lock().await;
            if let Some(raced) = active.as_ref().map(|a| a.session.id) {
                // Another play() slipped in between; supersede it as well
                drop(active);
                inner.finish(raced, EndReason::Superseded).await;
                active = inner.active.lock().await;
            }
            *active = Some(ActiveSession {
                session,
                handle: None,
                cancel: cancel.clone(),
                outcome_tx: Some(outcome_tx),
                degraded: false,
                caption_origin: 0.0,
            });
        }

        info!(
            "Narration {} loading: {} sentences from index {}",
            session_id,
            request.sentences.len(),
            request.start_index
        );
        inner.emit_state_change(session_id, SessionState::Idle, SessionState::Loading);
        (session_id, cancel, outcome_rx)
    }

    /// Provided payload, else cache, else (if enabled) TTS through the cache
    async fn resolve_payload(
        &self,
        session_id: Uuid,
        request: &NarrationRequest,
        cancel: &CancellationToken,
    ) -> Option<AudioPayload> {
        let inner = &self.inner;
        if let Some(payload) = request.audio.clone() {
            return Some(payload);
        }
        if !inner.synthesize_on_miss {
            return inner.cache.get(&request.text);
        }

        let fetched = tokio::select! {
            _ = cancel.cancelled() => return None,
            fetched = inner.cache.fetch(&request.text) => fetched,
        };
        match fetched {
            Ok(payload) => payload,
            Err(e) => {
                warn!("No audio for narration {}: {}", session_id, e);
                inner.emit_error(Some(session_id), &e, e.to_string());
                None
            }
        }
    }

    /// Walk the backend plan until something plays
    ///
    /// Returns None only when the session was cancelled.
    async fn start_chain(
        &self,
        session_id: Uuid,
        payload: Option<AudioPayload>,
        request: &NarrationRequest,
        cancel: &CancellationToken,
    ) -> Option<Started> {
        let inner = &self.inner;
        let settings = &inner.settings;

        let chain = selection::plan(SelectionInput {
            order: &settings.backend_order,
            has_payload: payload.is_some(),
            decode_context_running: inner.decode_context_running(),
            prefer_buffered_once: inner.prefer_buffered_once.swap(false, Ordering::SeqCst),
        });
        debug!("Narration {} backend plan: {:?}", session_id, chain);

        let params = StartParams {
            offset_seconds: request.resume_at_seconds.unwrap_or(0.0),
            muted: inner.muted.load(Ordering::SeqCst),
        };
        let mut last_error: Option<Error> = None;

        for kind in chain {
            if cancel.is_cancelled() {
                return None;
            }

            if kind == BackendKind::Synthetic {
                let degraded = last_error.is_some();
                if let Some(err) = last_error.take() {
                    warn!(
                        "Every audio backend failed for narration {}; showing captions only",
                        session_id
                    );
                    inner.emit_error(Some(session_id), &err, format!("playback-blocked: {}", err));
                }
                let duration = estimate_duration_seconds(
                    &request.text,
                    settings.synthetic_words_per_second,
                    settings.synthetic_min_seconds,
                );
                let start = inner.synthetic.start(duration, params);
                return Some(Started {
                    kind,
                    handle: start.handle,
                    signals: start.signals,
                    duration_seconds: duration,
                    authoritative: false,
                    degraded,
                });
            }

            let (Some(backend), Some(payload)) = (inner.backend(kind), payload.as_ref()) else {
                continue;
            };

            match self.try_backend(backend, payload, params, cancel).await {
                Ok(Some(start)) => {
                    let known = start.handle.duration_seconds();
                    let duration = known.unwrap_or_else(|| {
                        estimate_duration_seconds(
                            &request.text,
                            settings.synthetic_words_per_second,
                            settings.synthetic_min_seconds,
                        )
                    });
                    return Some(Started {
                        kind,
                        handle: start.handle,
                        signals: start.signals,
                        duration_seconds: duration,
                        authoritative: known.is_some(),
                        degraded: false,
                    });
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!("{} failed for narration {}: {}; falling back", kind, session_id, e);
                    last_error = Some(e);
                }
            }
        }

        // The plan always ends with Synthetic
        None
    }

    /// Start one backend; an element backend gets one unlock-and-retry
    ///
    /// `Ok(None)` means the session was cancelled while starting.
    async fn try_backend(
        &self,
        backend: &Arc<dyn AudioBackend>,
        payload: &AudioPayload,
        params: StartParams,
        cancel: &CancellationToken,
    ) -> Result<Option<BackendStart>> {
        let first = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            result = backend.start(payload, params) => result,
        };
        let err = match first {
            Ok(start) => return Ok(Some(start)),
            Err(e) => e,
        };

        if backend.kind() != BackendKind::BufferedElement || !self.inner.settings.unlock_retry {
            return Err(err);
        }

        debug!("Element start failed ({}); playing unlock sound and retrying", err);
        if let Err(unlock_err) = backend.unlock().await {
            debug!("Unlock failed: {}", unlock_err);
            return Err(err);
        }
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            result = backend.start(payload, params) => result.map(Some),
        }
    }

    /// Make a started backend the live playback of `session_id`
    async fn install(&self, session_id: Uuid, request: &NarrationRequest, started: Started) {
        let inner = &self.inner;
        let mut guard = inner.active.lock().await;
        let active = match guard.as_mut() {
            Some(a) if a.session.id == session_id && !a.cancel.is_cancelled() => a,
            _ => {
                debug!("Narration {} gone before install; stopping backend", session_id);
                started.handle.stop();
                return;
            }
        };

        let now = Instant::now();
        let muted = inner.muted.load(Ordering::SeqCst);
        started.handle.set_muted(muted);

        let session = &mut active.session;
        session.backend = started.kind;
        session.duration_seconds = started.duration_seconds.max(0.0);
        session.duration_authoritative = started.authoritative;
        let offset = request
            .resume_at_seconds
            .unwrap_or(0.0)
            .min(session.duration_seconds);
        session.elapsed_seconds = offset;
        session.begin_playing(now);
        let old_state = match session.transition(SessionState::Playing) {
            Ok(old) => old,
            Err(e) => {
                warn!("Cannot start narration: {}", e);
                started.handle.stop();
                return;
            }
        };

        inner.captions.schedule_from(
            session_id,
            session.duration_seconds,
            &session.sentences,
            session.start_index,
            offset,
        );
        inner.watchdog.arm(
            session_id,
            time::seconds_to_duration(session.duration_seconds - offset),
            "narration start",
        );
        session.guard_deadline = inner.watchdog.deadline();
        inner.video.start();

        active.handle = Some(Arc::clone(&started.handle));
        active.degraded = started.degraded;
        active.caption_origin = 0.0;

        let fresh_gesture = inner.gesture_fresh.swap(false, Ordering::SeqCst);
        inner.prefer_buffered_once.store(
            fresh_gesture && started.kind == BackendKind::BufferedElement,
            Ordering::SeqCst,
        );

        let duration = session.duration_seconds;
        let start_index = session.start_index;
        let cancel = active.cancel.clone();
        drop(guard);

        inner.emit_state_change(session_id, old_state, SessionState::Playing);
        info!(
            "Narration {} playing on {} ({:.3}s{})",
            session_id,
            started.kind,
            duration,
            if started.authoritative { "" } else { ", estimated" }
        );
        inner.bus.emit_lossy(NarrationEvent::NarrationStarted {
            session_id,
            backend: started.kind,
            duration_seconds: duration,
            start_index,
            timestamp: time::now(),
        });

        super::signals::spawn_session_driver(
            Arc::clone(&self.inner),
            session_id,
            started.signals,
            cancel,
        );
    }
}
