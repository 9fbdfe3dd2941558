//! Headless audio backends
//!
//! Stand-ins for the two browser playback paths so the service runs
//! without a device. Timing is real (symphonia supplies durations); audio
//! itself is not rendered.
//!
//! - [`HeadlessDecodeBackend`]: decodes the whole payload up front and
//!   knows its exact duration; refuses to start while its decode context
//!   is suspended.
//! - [`HeadlessElementBackend`]: element-style playback; duration arrives
//!   late as a metadata signal and playback may require an unlock first.

use crate::audio::backend::{AudioBackend, BackendStart, StartParams};
use crate::audio::clock::{ClockHandle, ClockSpec};
use crate::audio::decoder;
use crate::audio::AudioPayload;
use crate::error::{Error, Result};
use async_trait::async_trait;
use narrator_common::events::BackendKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Delay before an element reports its metadata
const METADATA_DELAY: Duration = Duration::from_millis(20);

/// StreamingDecode backend
pub struct HeadlessDecodeBackend {
    context_running: AtomicBool,
}

impl HeadlessDecodeBackend {
    pub fn new(context_running: bool) -> Self {
        Self {
            context_running: AtomicBool::new(context_running),
        }
    }

    /// Suspend the decode context (as a browser does without a gesture)
    pub fn suspend(&self) {
        self.context_running.store(false, Ordering::SeqCst);
    }

    pub fn is_context_running(&self) -> bool {
        self.context_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioBackend for HeadlessDecodeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::StreamingDecode
    }

    fn is_available(&self) -> bool {
        self.is_context_running()
    }

    async fn start(&self, payload: &AudioPayload, params: StartParams) -> Result<BackendStart> {
        if !self.is_context_running() {
            return Err(Error::BackendUnavailable(
                "decode context is suspended".to_string(),
            ));
        }

        let info = decoder::decode_clip(payload)?;
        debug!(
            "Decode backend starting {:.3}s clip at {:.3}s",
            info.duration_seconds, params.offset_seconds
        );

        let (handle, signals) = ClockHandle::start(ClockSpec {
            duration_seconds: info.duration_seconds,
            offset_seconds: params.offset_seconds,
            muted: params.muted,
            seekable: true,
            duration_known: true,
        });
        Ok(BackendStart { handle, signals })
    }

    async fn unlock(&self) -> Result<()> {
        if !self.context_running.swap(true, Ordering::SeqCst) {
            info!("Decode context resumed");
        }
        Ok(())
    }
}

/// BufferedElement backend
pub struct HeadlessElementBackend {
    requires_gesture: bool,
    unlocked: AtomicBool,
}

impl HeadlessElementBackend {
    pub fn new(requires_gesture: bool) -> Self {
        Self {
            requires_gesture,
            unlocked: AtomicBool::new(false),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioBackend for HeadlessElementBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::BufferedElement
    }

    async fn start(&self, payload: &AudioPayload, params: StartParams) -> Result<BackendStart> {
        if self.requires_gesture && !self.is_unlocked() {
            return Err(Error::AutoplayRejected(
                "element playback requires a user gesture".to_string(),
            ));
        }

        let duration = match decoder::probe_duration(payload)? {
            Some(duration) => duration,
            None => decoder::decode_clip(payload)?.duration_seconds,
        };

        let (handle, signals) = ClockHandle::start(ClockSpec {
            duration_seconds: duration,
            offset_seconds: params.offset_seconds,
            muted: params.muted,
            seekable: true,
            duration_known: false,
        });

        let metadata = Arc::clone(&handle);
        tokio::spawn(async move {
            tokio::time::sleep(METADATA_DELAY).await;
            metadata.announce_duration();
        });

        Ok(BackendStart { handle, signals })
    }

    async fn unlock(&self) -> Result<()> {
        if !self.unlocked.swap(true, Ordering::SeqCst) {
            debug!("Element playback unlocked");
        }
        Ok(())
    }
}
