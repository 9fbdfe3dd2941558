//! # Narrator Engine
//!
//! Narration playback with synchronized captions.
//!
//! **Purpose:** Play synthesized narration across unreliable playback
//! backends while keeping captions, a forward-progress watchdog and an
//! ambient video in step with it, and provide an HTTP/SSE control
//! interface.
//!
//! **Architecture:** one active session owned by [`playback::NarrationEngine`];
//! audio backends behind [`audio::AudioBackend`], TTS behind
//! [`tts::SpeechSynthesizer`].

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod tts;

pub use error::{Error, Result};
pub use playback::{NarrationEngine, NarrationRequest, PlaybackOutcome};
