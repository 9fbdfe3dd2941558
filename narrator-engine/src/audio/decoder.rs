//! Payload decoding using symphonia
//!
//! The headless backends only need timing information, so decoding counts
//! frames instead of producing PCM. Narration clips are short, so decoding
//! happens inline on the calling task.

use crate::audio::AudioPayload;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Timing facts about a decoded clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: u64,
}

fn open_format(payload: &AudioPayload) -> Result<Box<dyn FormatReader>> {
    if payload.is_empty() {
        return Err(Error::Decode("empty payload".to_string()));
    }
    let mss = MediaSourceStream::new(Box::new(Cursor::new(payload.clone())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;
    Ok(probed.format)
}

/// Decode the whole payload and measure its exact duration
///
/// # Errors
/// `Error::Decode` when the container or codec is unsupported, or no audio
/// frames could be decoded.
pub fn decode_clip(payload: &AudioPayload) -> Result<ClipInfo> {
    let mut format = open_format(payload)?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("Unknown sample rate".to_string()))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut frames: u64 = 0;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => frames += decoded.frames() as u64,
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packet; skip it like a player would
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
        }
    }

    if frames == 0 {
        return Err(Error::Decode("No audio frames decoded".to_string()));
    }

    let info = ClipInfo {
        duration_seconds: frames as f64 / sample_rate as f64,
        sample_rate,
        channels,
        frames,
    };
    debug!(
        "Decoded clip: {} frames @ {} Hz ({:.3}s)",
        info.frames, info.sample_rate, info.duration_seconds
    );
    Ok(info)
}

/// Read the duration from container metadata without decoding
///
/// Returns `Ok(None)` when the container does not declare a frame count.
pub fn probe_duration(payload: &AudioPayload) -> Result<Option<f64>> {
    let format = open_format(payload)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    match (track.codec_params.n_frames, track.codec_params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Ok(Some(frames as f64 / rate as f64)),
        _ => Ok(None),
    }
}
