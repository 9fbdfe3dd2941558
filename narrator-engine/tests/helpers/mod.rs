//! Shared test fixtures
//!
//! Scripted backends, a recording video output, a counting synthesizer and
//! an event collector for driving the engine on paused tokio time.

#![allow(dead_code)]

use async_trait::async_trait;
use narrator_common::events::{BackendKind, NarrationEvent};
use narrator_engine::audio::{
    AudioBackend, AudioPayload, BackendSignal, BackendStart, ClockHandle, ClockSpec,
    PlaybackHandle, StartParams,
};
use narrator_engine::config::EngineSettings;
use narrator_engine::error::{Error, Result};
use narrator_engine::playback::{NarrationEngine, NarrationRequest, PlaybackOutcome, VideoOutput};
use narrator_engine::tts::SpeechSynthesizer;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

// ============================================================================
// Audio fixtures
// ============================================================================

/// In-memory 16-bit mono WAV of `seconds` length
pub fn wav_payload(seconds: f64) -> AudioPayload {
    let sample_rate = 8_000;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let total = (seconds * sample_rate as f64).round() as u32;
        for i in 0..total {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 220.0 * 2.0 * std::f32::consts::PI).sin();
            writer
                .write_sample((sample * i16::MAX as f32 * 0.1) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    AudioPayload::new(cursor.into_inner())
}

/// Opaque payload for scripted backends (never decoded)
pub fn dummy_payload() -> AudioPayload {
    AudioPayload::new(vec![0u8; 64])
}

pub fn hello_request() -> NarrationRequest {
    NarrationRequest::new("Hello. How are you?", ["Hello.", "How are you?"])
}

// ============================================================================
// Scripted backend
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum FailKind {
    Decode,
    Autoplay,
    Unavailable,
}

impl FailKind {
    fn error(self) -> Error {
        match self {
            FailKind::Decode => Error::Decode("scripted decode failure".to_string()),
            FailKind::Autoplay => Error::AutoplayRejected("scripted autoplay block".to_string()),
            FailKind::Unavailable => {
                Error::BackendUnavailable("scripted suspended context".to_string())
            }
        }
    }
}

/// What one `start` call does
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Fail(FailKind),
    /// Clock playback with a known duration
    Play { duration: f64 },
    /// Duration reported through `DurationKnown` after `delay`
    PlayLateDuration { duration: f64, delay: Duration },
    /// Reports a duration but never ends
    Stuck { duration: f64 },
    /// Reports a duration, then fails after `after`
    FailMidway { duration: f64, after: Duration },
    /// No duration; reports progress every `tick` and ends after `length`
    Unsized { length: f64, tick: Duration },
}

/// Handle that only does what the test tells it to
pub struct ManualHandle {
    duration: Option<f64>,
    signals: mpsc::UnboundedSender<BackendSignal>,
    pub muted: AtomicBool,
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
    pub resumes: Mutex<Vec<Option<f64>>>,
}

impl ManualHandle {
    pub fn new(duration: Option<f64>) -> (Arc<Self>, mpsc::UnboundedReceiver<BackendSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                duration,
                signals: tx,
                muted: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                resumes: Mutex::new(Vec::new()),
            }),
            rx,
        )
    }

    pub fn send(&self, signal: BackendSignal) {
        let _ = self.signals.send(signal);
    }
}

impl PlaybackHandle for ManualHandle {
    fn duration_seconds(&self) -> Option<f64> {
        self.duration
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self, from_seconds: Option<f64>) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumes.lock().unwrap().push(from_seconds);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}

/// The handle a scripted start produced
#[derive(Clone)]
pub enum StartedHandle {
    Clock(Arc<ClockHandle>),
    Manual(Arc<ManualHandle>),
}

impl StartedHandle {
    pub fn is_muted(&self) -> bool {
        match self {
            StartedHandle::Clock(h) => h.is_muted(),
            StartedHandle::Manual(h) => h.muted.load(Ordering::SeqCst),
        }
    }
}

/// Backend whose behaviour per `start` call is scripted
pub struct ScriptedBackend {
    kind: BackendKind,
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    available: AtomicBool,
    pub starts: AtomicUsize,
    pub unlocks: AtomicUsize,
    pub start_params: Mutex<Vec<StartParams>>,
    pub handles: Mutex<Vec<StartedHandle>>,
}

impl ScriptedBackend {
    /// Backend that runs `scripts` in order, then `fallback` forever
    pub fn new(kind: BackendKind, scripts: Vec<Script>, fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            kind,
            scripts: Mutex::new(scripts.into()),
            fallback,
            available: AtomicBool::new(true),
            starts: AtomicUsize::new(0),
            unlocks: AtomicUsize::new(0),
            start_params: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn always(kind: BackendKind, script: Script) -> Arc<Self> {
        Self::new(kind, Vec::new(), script)
    }

    /// Report the backend as suspended until unlocked
    pub fn suspended(self: Arc<Self>) -> Arc<Self> {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn unlock_count(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }

    pub fn last_handle(&self) -> Option<StartedHandle> {
        self.handles.lock().unwrap().last().cloned()
    }

    fn next_script(&self) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback)
    }

    fn clock(&self, duration: f64, params: StartParams, known: bool) -> BackendStart {
        let (handle, signals) = ClockHandle::start(ClockSpec {
            duration_seconds: duration,
            offset_seconds: params.offset_seconds,
            muted: params.muted,
            seekable: true,
            duration_known: known,
        });
        self.handles
            .lock()
            .unwrap()
            .push(StartedHandle::Clock(Arc::clone(&handle)));
        BackendStart { handle, signals }
    }

    fn manual(
        &self,
        duration: Option<f64>,
        params: StartParams,
    ) -> (Arc<ManualHandle>, BackendStart) {
        let (handle, signals) = ManualHandle::new(duration);
        handle.muted.store(params.muted, Ordering::SeqCst);
        self.handles
            .lock()
            .unwrap()
            .push(StartedHandle::Manual(Arc::clone(&handle)));
        let start = BackendStart {
            handle: handle.clone(),
            signals,
        };
        (handle, start)
    }
}

#[async_trait]
impl AudioBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn start(&self, _payload: &AudioPayload, params: StartParams) -> Result<BackendStart> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.start_params.lock().unwrap().push(params);

        if !self.is_available() {
            return Err(FailKind::Unavailable.error());
        }

        match self.next_script() {
            Script::Fail(kind) => Err(kind.error()),
            Script::Play { duration } => Ok(self.clock(duration, params, true)),
            Script::PlayLateDuration { duration, delay } => {
                let start = self.clock(duration, params, false);
                if let Some(StartedHandle::Clock(handle)) = self.last_handle() {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        handle.announce_duration();
                    });
                }
                Ok(start)
            }
            Script::Stuck { duration } => Ok(self.manual(Some(duration), params).1),
            Script::FailMidway { duration, after } => {
                let (handle, start) = self.manual(Some(duration), params);
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    handle.send(BackendSignal::Failed("scripted device error".to_string()));
                });
                Ok(start)
            }
            Script::Unsized { length, tick } => {
                let (handle, start) = self.manual(None, params);
                tokio::spawn(async move {
                    let mut position = 0.0;
                    while position < length {
                        tokio::time::sleep(tick).await;
                        if handle.stopped.load(Ordering::SeqCst) {
                            return;
                        }
                        position = (position + tick.as_secs_f64()).min(length);
                        handle.send(BackendSignal::Progress {
                            position_seconds: position,
                        });
                    }
                    handle.send(BackendSignal::Ended);
                });
                Ok(start)
            }
        }
    }

    async fn unlock(&self) -> Result<()> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        self.available.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Video and TTS fakes
// ============================================================================

#[derive(Default)]
pub struct RecordingVideo {
    pub plays: AtomicUsize,
    pub pauses: AtomicUsize,
    pub playing: AtomicBool,
}

#[async_trait]
impl VideoOutput for RecordingVideo {
    async fn play(&self) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Synthesizer that counts calls and answers after a delay
pub struct CountingSynthesizer {
    pub calls: AtomicUsize,
    delay: Duration,
    reply: Option<AudioPayload>,
    fail: bool,
}

impl CountingSynthesizer {
    pub fn returning(payload: AudioPayload, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            reply: Some(payload),
            fail: false,
        })
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            reply: None,
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for CountingSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Option<AudioPayload>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(Error::Network("scripted TTS outage".to_string()));
        }
        Ok(self.reply.clone())
    }
}

// ============================================================================
// Engine and events
// ============================================================================

pub fn settings() -> EngineSettings {
    EngineSettings::default()
}

/// Engine over the given backends with a no-op synthesizer
pub fn engine_with(backends: &[Arc<ScriptedBackend>]) -> NarrationEngine {
    let mut builder = NarrationEngine::builder(settings());
    for backend in backends {
        builder = builder.backend(backend.clone());
    }
    builder.build().unwrap()
}

pub fn spawn_play(
    engine: &NarrationEngine,
    request: NarrationRequest,
) -> JoinHandle<Result<PlaybackOutcome>> {
    let engine = engine.clone();
    tokio::spawn(async move { engine.play(request).await })
}

/// Let spawned tasks run without advancing paused time
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Collects events from an engine's bus
pub struct EventCollector {
    rx: broadcast::Receiver<NarrationEvent>,
    seen: Vec<NarrationEvent>,
}

impl EventCollector {
    pub fn new(engine: &NarrationEngine) -> Self {
        Self {
            rx: engine.subscribe(),
            seen: Vec::new(),
        }
    }

    /// All events received so far
    pub fn events(&mut self) -> &[NarrationEvent] {
        while let Ok(event) = self.rx.try_recv() {
            self.seen.push(event);
        }
        &self.seen
    }

    pub fn of_type(&mut self, event_type: &str) -> Vec<NarrationEvent> {
        self.events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub fn count(&mut self, event_type: &str) -> usize {
        self.of_type(event_type).len()
    }

    /// Indices of every `CaptionAdvanced` so far
    pub fn caption_indices(&mut self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                NarrationEvent::CaptionAdvanced { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }
}
