//! Playback backend contracts
//!
//! A backend turns a payload into a running [`PlaybackHandle`] plus a
//! channel of [`BackendSignal`]s. The arbiter never inspects a backend
//! beyond these traits; which backend runs is decided by
//! [`BackendKind`] in the selection step.

use crate::audio::AudioPayload;
use crate::error::Result;
use async_trait::async_trait;
use narrator_common::events::BackendKind;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Parameters for starting playback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartParams {
    /// Position to start from (resume-at-offset narrations)
    pub offset_seconds: f64,
    /// Start muted
    pub muted: bool,
}

/// Signals a running backend reports back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSignal {
    /// Authoritative duration became known (e.g. metadata loaded late)
    DurationKnown(f64),
    /// Playback position report; may arrive at high frequency
    Progress { position_seconds: f64 },
    /// Playback reached the end
    Ended,
    /// Playback failed after it started
    Failed(String),
}

/// Control surface of a started playback
pub trait PlaybackHandle: Send + Sync {
    /// Duration if the backend knows it
    fn duration_seconds(&self) -> Option<f64>;

    /// Whether `resume` can seek to an explicit offset
    fn supports_seek(&self) -> bool;

    fn pause(&self);

    /// Resume playback, seeking to `from_seconds` when given
    fn resume(&self, from_seconds: Option<f64>);

    /// Stop for good; no further signals are sent
    fn stop(&self);

    fn set_muted(&self, muted: bool);
}

/// A started playback
pub struct BackendStart {
    pub handle: Arc<dyn PlaybackHandle>,
    pub signals: mpsc::UnboundedReceiver<BackendSignal>,
}

/// Audio-producing backend (`StreamingDecode` or `BufferedElement`)
#[async_trait]
pub trait AudioBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether the backend can be tried right now (decode context running)
    fn is_available(&self) -> bool {
        true
    }

    /// Start playing `payload`
    ///
    /// # Errors
    /// - `Error::Decode` when the payload cannot be decoded
    /// - `Error::AutoplayRejected` when a user gesture is required
    /// - `Error::BackendUnavailable` when the backend is suspended
    async fn start(&self, payload: &AudioPayload, params: StartParams) -> Result<BackendStart>;

    /// Establish playback permission (inaudible unlock sound, context resume)
    async fn unlock(&self) -> Result<()> {
        Ok(())
    }
}
