//! Narration engine
//!
//! **Module Structure:**
//! - `core.rs`: construction, `play`, backend fallback, session teardown
//! - `control.rs`: pause/resume/stop, mute, gestures, snapshot
//! - `signals.rs`: backend signal driver and watchdog listener

mod control;
mod core;
mod signals;

pub use self::core::{NarrationEngine, NarrationEngineBuilder};
