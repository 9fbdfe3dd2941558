//! Event types for the narration event system
//!
//! Provides the shared event definitions and the EventBus used by the
//! engine and by anything observing it (SSE clients, the phase controller).

mod playback_types;

pub use playback_types::{BackendKind, EndReason, ErrorCode, SessionState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Narration event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NarrationEvent {
    /// Session state changed (e.g. Playing -> Paused)
    PlaybackStateChanged {
        session_id: Uuid,
        old_state: SessionState,
        new_state: SessionState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Narration began producing output
    NarrationStarted {
        session_id: Uuid,
        backend: BackendKind,
        /// Duration used for scheduling (estimate until authoritative)
        duration_seconds: f64,
        /// Caption index this utterance begins at
        start_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Narration finished
    ///
    /// A watchdog completion looks the same as a natural one except for
    /// `end_reason`.
    NarrationEnded {
        session_id: Uuid,
        completed: bool,
        skipped: bool,
        end_reason: EndReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Caption cursor moved forward
    CaptionAdvanced {
        session_id: Uuid,
        /// New cursor value (number of captions fully revealed)
        index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every caption in the current batch has been revealed
    CaptionsDone {
        session_id: Uuid,
        /// Cursor value at the end of the batch
        index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Non-blocking narration problem (shown as a tip, never blocks flow)
    NarrationError {
        session_id: Option<Uuid>,
        code: ErrorCode,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Mute flag toggled
    MuteChanged {
        muted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Watchdog force-completed a session
    WatchdogIntervention {
        session_id: Uuid,
        /// Reason string that last armed the guard
        reason: String,
        /// Total interventions since startup
        interventions_total: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl NarrationEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            NarrationEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            NarrationEvent::NarrationStarted { .. } => "NarrationStarted",
            NarrationEvent::NarrationEnded { .. } => "NarrationEnded",
            NarrationEvent::CaptionAdvanced { .. } => "CaptionAdvanced",
            NarrationEvent::CaptionsDone { .. } => "CaptionsDone",
            NarrationEvent::NarrationError { .. } => "NarrationError",
            NarrationEvent::MuteChanged { .. } => "MuteChanged",
            NarrationEvent::WatchdogIntervention { .. } => "WatchdogIntervention",
        }
    }

    /// Session the event belongs to, if any
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            NarrationEvent::PlaybackStateChanged { session_id, .. }
            | NarrationEvent::NarrationStarted { session_id, .. }
            | NarrationEvent::NarrationEnded { session_id, .. }
            | NarrationEvent::CaptionAdvanced { session_id, .. }
            | NarrationEvent::CaptionsDone { session_id, .. }
            | NarrationEvent::WatchdogIntervention { session_id, .. } => Some(*session_id),
            NarrationEvent::NarrationError { session_id, .. } => *session_id,
            NarrationEvent::MuteChanged { .. } => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use narrator_common::events::{EventBus, NarrationEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(NarrationEvent::MuteChanged {
///     muted: true,
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NarrationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NarrationEvent,
    ) -> Result<usize, broadcast::error::SendError<NarrationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NarrationEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
