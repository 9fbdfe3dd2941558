//! HTTP TTS client
//!
//! POSTs `{ "text": ... }` to the configured endpoint; the response body is
//! the encoded audio clip.

use super::SpeechSynthesizer;
use crate::audio::AudioPayload;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
}

pub struct HttpSynthesizer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    /// Create a client for `endpoint` with a per-request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Option<AudioPayload>> {
        debug!("Requesting synthesis ({} chars)", text.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&SynthesisRequest { text })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Network(format!(
                "TTS service returned {}",
                status
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        debug!("Received {} bytes of audio", bytes.len());
        Ok(Some(AudioPayload::new(bytes.to_vec())))
    }
}
