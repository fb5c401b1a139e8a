//! HTTP request handlers
//!
//! Every playback failure maps to a JSON body of the form
//! `{"status": "error", "kind": ..., "message": ...}`; `message` is the
//! text shown to the end user.

use crate::api::server::AppContext;
use crate::error::PlaybackError;
use crate::playback::SkipOutcome;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use saori_common::events::PlaybackState;
use saori_common::{ChannelId, GuildId, TrackMetadata, TrackReference};
use serde::{Deserialize, Serialize};
use tracing::info;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub kind: String,
    pub message: String,
}

/// Track as presented over HTTP
#[derive(Debug, Serialize)]
pub struct TrackInfo {
    url: String,
    title: Option<String>,
    thumbnail: Option<String>,
}

impl From<&TrackReference> for TrackInfo {
    fn from(track: &TrackReference) -> Self {
        Self {
            url: track.locator.clone(),
            title: track.title.clone(),
            thumbnail: track.thumbnail.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaylistResponse {
    guild_id: GuildId,
    tracks: Vec<TrackInfo>,
}

#[derive(Debug, Deserialize)]
pub struct AddTrackRequest {
    url: String,
}

#[derive(Debug, Serialize)]
pub struct AddTrackResponse {
    status: String,
    position: usize,
    track: TrackInfo,
}

#[derive(Debug, Deserialize)]
pub struct RemoveTrackQuery {
    url: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveTrackResponse {
    status: String,
    removed: TrackInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    /// Requester's current voice channel; absent when they are not in one
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    status: String,
    now_playing: TrackMetadata,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    status: String,
    next: Option<TrackInfo>,
    queue_empty: bool,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    status: String,
    previous_state: PlaybackState,
    removed: Option<TrackInfo>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    guild_id: GuildId,
    state: PlaybackState,
    current: Option<TrackInfo>,
    now_playing: Option<TrackMetadata>,
    queue_length: usize,
    voice_connected: bool,
}

// ============================================================================
// Error mapping
// ============================================================================

fn status_code(error: &PlaybackError) -> StatusCode {
    match error {
        PlaybackError::NotFound { .. } => StatusCode::NOT_FOUND,
        PlaybackError::ResolutionError { .. } | PlaybackError::ConnectionError { .. } => {
            StatusCode::BAD_GATEWAY
        }
        PlaybackError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        PlaybackError::UserNotInVoiceChannel
        | PlaybackError::EmptyPlaylist
        | PlaybackError::NotPlaying
        | PlaybackError::TrackInUse { .. }
        | PlaybackError::Cancelled => StatusCode::CONFLICT,
    }
}

fn playback_error(error: PlaybackError) -> ApiError {
    (
        status_code(&error),
        Json(ErrorResponse {
            status: "error".to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            status: "error".to_string(),
            kind: "InvalidInput".to_string(),
            message: message.into(),
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "music_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Playlist Endpoints
// ============================================================================

/// GET /guilds/:guild_id/playlist
pub async fn list_playlist(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
) -> Json<PlaylistResponse> {
    let guild_id = GuildId::new(guild_id);
    let tracks = ctx.engine.list_tracks(guild_id).await;

    Json(PlaylistResponse {
        guild_id,
        tracks: tracks.iter().map(TrackInfo::from).collect(),
    })
}

/// POST /guilds/:guild_id/playlist
pub async fn add_track(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
    Json(req): Json<AddTrackRequest>,
) -> ApiResult<(StatusCode, Json<AddTrackResponse>)> {
    let url = req.url.trim();
    if url.is_empty() {
        return Err(bad_request("url must not be empty"));
    }

    let guild_id = GuildId::new(guild_id);
    let added = ctx
        .engine
        .add_track(guild_id, url)
        .await
        .map_err(playback_error)?;
    info!("Guild {} added {} at position {}", guild_id, url, added.position);

    Ok((
        StatusCode::CREATED,
        Json(AddTrackResponse {
            status: "ok".to_string(),
            position: added.position,
            track: TrackInfo::from(&added.track),
        }),
    ))
}

/// DELETE /guilds/:guild_id/playlist?url=
pub async fn remove_track(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
    Query(query): Query<RemoveTrackQuery>,
) -> ApiResult<Json<RemoveTrackResponse>> {
    let guild_id = GuildId::new(guild_id);
    let removed = ctx
        .engine
        .remove_track(guild_id, query.url.trim())
        .await
        .map_err(playback_error)?;
    info!("Guild {} removed {}", guild_id, removed.locator);

    Ok(Json(RemoveTrackResponse {
        status: "ok".to_string(),
        removed: TrackInfo::from(&removed),
    }))
}

// ============================================================================
// Playback Endpoints
// ============================================================================

/// POST /guilds/:guild_id/play
///
/// Replies once the track is streaming, or with the failure that stopped it.
pub async fn play(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
    req: Option<Json<PlayRequest>>,
) -> ApiResult<Json<PlayResponse>> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let channel = match req.channel_id.as_deref().map(str::parse::<ChannelId>) {
        Some(Ok(channel)) => Some(channel),
        Some(Err(e)) => return Err(bad_request(e.to_string())),
        None => None,
    };

    let now_playing = ctx
        .engine
        .play(GuildId::new(guild_id), channel)
        .await
        .map_err(playback_error)?;

    Ok(Json(PlayResponse {
        status: "ok".to_string(),
        now_playing,
    }))
}

/// POST /guilds/:guild_id/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
) -> ApiResult<Json<SkipResponse>> {
    let outcome = ctx
        .engine
        .skip(GuildId::new(guild_id))
        .await
        .map_err(playback_error)?;

    let next = match &outcome {
        SkipOutcome::Advanced { next } => Some(TrackInfo::from(next)),
        SkipOutcome::QueueEmpty => None,
    };
    Ok(Json(SkipResponse {
        status: "ok".to_string(),
        queue_empty: next.is_none(),
        next,
    }))
}

/// POST /guilds/:guild_id/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
) -> ApiResult<Json<StopResponse>> {
    let outcome = ctx
        .engine
        .stop(GuildId::new(guild_id))
        .await
        .map_err(playback_error)?;

    Ok(Json(StopResponse {
        status: "ok".to_string(),
        previous_state: outcome.previous_state,
        removed: outcome.removed.as_ref().map(TrackInfo::from),
    }))
}

/// GET /guilds/:guild_id/status
pub async fn status(
    State(ctx): State<AppContext>,
    Path(guild_id): Path<u64>,
) -> Json<StatusResponse> {
    let guild_id = GuildId::new(guild_id);
    let status = ctx.engine.status(guild_id).await;
    let queue_length = ctx.engine.store().len(guild_id).await;
    let voice_connected = ctx.engine.voice().is_connected(guild_id).await;

    Json(StatusResponse {
        guild_id,
        state: status.state,
        current: status.current.as_ref().map(TrackInfo::from),
        now_playing: status.now_playing,
        queue_length,
        voice_connected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status_code(&PlaybackError::NotFound {
                locator: "x".to_string()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_code(&PlaybackError::UserNotInVoiceChannel),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_code(&PlaybackError::ConnectionError {
                reason: "x".to_string()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_code(&PlaybackError::ShuttingDown),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_body_carries_kind_and_message() {
        let (code, Json(body)) = playback_error(PlaybackError::EmptyPlaylist);
        assert_eq!(code, StatusCode::CONFLICT);
        assert_eq!(body.status, "error");
        assert_eq!(body.kind, "EmptyPlaylist");
        assert_eq!(body.message, "The playlist is empty, please add a song");
    }
}
