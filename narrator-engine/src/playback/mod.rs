//! Narration playback
//!
//! The engine owns one session at a time and drives the clocks that must
//! stay in step with it: captions, the watchdog and the ambient video.

pub mod caption_scheduler;
pub mod engine;
pub mod pause_resume;
pub mod prefetch_cache;
pub mod selection;
pub mod session;
pub mod types;
pub mod video;
pub mod watchdog;

pub use caption_scheduler::{CaptionCursor, CaptionScheduler};
pub use engine::{NarrationEngine, NarrationEngineBuilder};
pub use prefetch_cache::PrefetchCache;
pub use types::{
    CacheStats, CaptionLine, EngineSnapshot, NarrationRequest, PlaybackOutcome, SessionSnapshot,
};
pub use video::{AuxiliaryVideoCoordinator, NullVideoOutput, VideoOutput};
pub use watchdog::{ArmOutcome, WatchdogGuard, WatchdogTrip};
