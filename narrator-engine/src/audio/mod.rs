//! Audio backends and payload handling
//!
//! Streaming decode and buffered element playback share the
//! [`AudioBackend`] contract; caption-only playback uses
//! [`SyntheticBackend`] directly.

pub mod backend;
pub mod clock;
pub mod decoder;
pub mod headless;
pub mod payload;
pub mod synthetic;

pub use backend::{AudioBackend, BackendSignal, BackendStart, PlaybackHandle, StartParams};
pub use clock::{ClockHandle, ClockSpec};
pub use headless::{HeadlessDecodeBackend, HeadlessElementBackend};
pub use payload::AudioPayload;
pub use synthetic::SyntheticBackend;
