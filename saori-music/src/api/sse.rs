//! Server-Sent Events broadcaster
//!
//! Streams playback events to dashboard clients, optionally filtered to a
//! single guild with `?guild_id=`.

use crate::api::server::AppContext;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use saori_common::events::MusicEvent;
use saori_common::GuildId;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    guild_id: Option<u64>,
}

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let guild = filter.guild_id.map(GuildId::new);
    debug!("New SSE client connected (guild filter: {:?})", guild);

    let stream = BroadcastStream::new(ctx.engine.subscribe()).filter_map(move |result| async move {
        match result {
            Ok(event) if guild.map_or(true, |g| event.guild_id() == g) => to_sse(&event),
            Ok(_) => None,
            Err(e) => {
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse(event: &MusicEvent) -> Option<Result<Event, Infallible>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
