//! HTTP request handlers

use crate::api::server::AppContext;
use crate::audio::AudioPayload;
use crate::error::Error;
use crate::playback::{CaptionLine, EngineSnapshot, NarrationRequest, PlaybackOutcome};
use axum::{extract::State, http::StatusCode, Json};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    text: String,
    sentences: Vec<CaptionLine>,
    #[serde(default)]
    start_index: usize,
    #[serde(default)]
    resume_at_seconds: Option<f64>,
    /// Base64-encoded audio clip
    #[serde(default)]
    audio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    muted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MuteResponse {
    pub muted: bool,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    text: String,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn status(code: StatusCode, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(StatusResponse {
            status: message.into(),
        }),
    )
}

fn error_response(e: Error) -> ApiError {
    let code = match e {
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    status(code, format!("error: {}", e))
}

fn ok(message: &str) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: message.to_string(),
    })
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "narrator_engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Narration Control
// ============================================================================

/// POST /narration/play - Play a narration; responds when it ends
pub async fn play(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayRequest>,
) -> Result<Json<PlaybackOutcome>, ApiError> {
    let audio = match req.audio {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| {
                    warn!("Rejected play request with bad audio encoding: {}", e);
                    status(StatusCode::BAD_REQUEST, format!("error: invalid base64 audio: {}", e))
                })?;
            Some(AudioPayload::new(bytes))
        }
        None => None,
    };

    let request = NarrationRequest {
        text: req.text,
        audio,
        sentences: req.sentences,
        start_index: req.start_index,
        resume_at_seconds: req.resume_at_seconds,
    };

    ctx.engine.play(request).await.map(Json).map_err(error_response)
}

/// POST /narration/pause
pub async fn pause(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    if ctx.engine.pause().await {
        Ok(ok("paused"))
    } else {
        Err(status(StatusCode::CONFLICT, "nothing is playing"))
    }
}

/// POST /narration/resume
pub async fn resume(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    if ctx.engine.resume().await {
        Ok(ok("playing"))
    } else {
        Err(status(StatusCode::CONFLICT, "nothing is paused"))
    }
}

/// POST /narration/stop
pub async fn stop(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    if ctx.engine.stop().await {
        info!("Narration stopped via API");
        ok("stopped")
    } else {
        ok("idle")
    }
}

/// POST /narration/gesture - Report a user gesture (unlocks playback)
pub async fn gesture(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.engine.notify_user_gesture().await;
    ok("ok")
}

/// POST /narration/mute
pub async fn set_mute(
    State(ctx): State<AppContext>,
    Json(req): Json<MuteRequest>,
) -> Json<MuteResponse> {
    ctx.engine.set_muted(req.muted).await;
    Json(MuteResponse {
        muted: ctx.engine.is_muted(),
    })
}

/// GET /narration/state
pub async fn get_state(State(ctx): State<AppContext>) -> Json<EngineSnapshot> {
    Json(ctx.engine.snapshot().await)
}

// ============================================================================
// Prefetch Cache
// ============================================================================

/// POST /prefetch - Start synthesizing upcoming narration text
pub async fn prefetch(
    State(ctx): State<AppContext>,
    Json(req): Json<TextRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    if req.text.trim().is_empty() {
        return Err(status(StatusCode::BAD_REQUEST, "error: text is empty"));
    }
    ctx.engine.cache().prefetch(&req.text);
    Ok((StatusCode::ACCEPTED, ok("prefetching")))
}

/// POST /prefetch/cancel
pub async fn cancel_prefetch(
    State(ctx): State<AppContext>,
    Json(req): Json<TextRequest>,
) -> Json<StatusResponse> {
    if ctx.engine.cache().cancel_prefetch(&req.text) {
        ok("cancelled")
    } else {
        ok("not in flight")
    }
}

/// POST /cache/clear
pub async fn clear_cache(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.engine.cache().clear();
    ok("cleared")
}
