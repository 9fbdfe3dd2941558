//! Text-to-speech client
//!
//! The engine only needs "text in, audio bytes out"; which service does
//! the synthesis is hidden behind [`SpeechSynthesizer`].

mod http;

pub use http::HttpSynthesizer;

use crate::audio::AudioPayload;
use crate::error::Result;
use async_trait::async_trait;

/// Synthesizes narration audio for a piece of text
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns `Ok(None)` when the service has no audio for `text`
    ///
    /// # Errors
    /// `Error::Network` when the service cannot be reached or fails.
    async fn synthesize(&self, text: &str) -> Result<Option<AudioPayload>>;
}

/// Synthesizer used when no TTS endpoint is configured
#[derive(Debug, Default)]
pub struct NoopSynthesizer;

#[async_trait]
impl SpeechSynthesizer for NoopSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Option<AudioPayload>> {
        Ok(None)
    }
}
