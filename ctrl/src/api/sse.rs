//! SSE transport: a long-lived event stream plus a side-channel POST endpoint

use axum::{
    body::Body,
    extract::{Extension, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use super::server::{AppState, TransportSettings};
use super::streamable::{parse_envelope, read_body, session_ref};
use crate::mcp::channels::ChannelGuard;
use crate::mcp::jsonrpc::JsonRpcResponse;
use crate::mcp::{CallContext, McpReply, SessionManager, SseEvent};
use crate::security::{PeerAddr, Rejection};

/// Keeps a stream's queue registered and its protocol session open for as
/// long as the stream lives
struct StreamGuard {
    channel: ChannelGuard,
    sessions: Arc<SessionManager>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.sessions.close(self.channel.id());
        tracing::info!("SSE stream {} closed", self.channel.id());
    }
}

/// Where clients POST their calls for this stream
fn message_endpoint(settings: &TransportSettings, headers: &HeaderMap, stream_id: &str) -> String {
    let base = match &settings.public_base_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost");
            format!("http://{}", host)
        }
    };
    format!("{}/sse/message?sessionId={}", base, stream_id)
}

/// GET /sse - open an event stream
pub async fn subscribe(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.shutdown.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let (channel, mut rx) = state.channels.open();
    let endpoint = message_endpoint(&state.settings, &headers, channel.id());
    tracing::info!("SSE stream {} opened", channel.id());
    let guard = StreamGuard {
        channel,
        sessions: state.sessions.clone(),
    };

    let shutdown = state.shutdown.clone();
    let stream = async_stream::stream! {
        let _guard = guard;

        yield Ok::<Event, Infallible>(Event::default().event("endpoint").data(endpoint));

        // Ends on shutdown, when the queue is closed, or when the client goes away
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => event,
            };
            let Some(event) = event else { break };
            yield Ok::<Event, Infallible>(Event::default()
                .event(&event.event_type)
                .data(&event.data));
        }
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.settings.sse_keepalive)
            .text("ping"),
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// POST /sse/message?sessionId=... - the reply goes out on the stream
pub async fn post_message(
    State(state): State<AppState>,
    Extension(peer): Extension<PeerAddr>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if !state.limiter.try_acquire(&peer.text) {
        tracing::warn!("Rate limited {}", peer.text);
        return Rejection::TooManyRequests.into_response();
    }

    let Some(stream_id) = query.session_id.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };
    if !state.channels.contains(&stream_id) {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    }

    let bytes = match read_body(body, state.settings.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(rejection) => return rejection.into_response(),
    };

    let reply = match parse_envelope(&bytes) {
        Err(err) => Some(JsonRpcResponse::error(None, err)),
        Ok(env) => {
            let call = CallContext {
                session: session_ref(&headers),
                stream_id: Some(stream_id.clone()),
            };
            match state.handler.handle(&env, &call).await {
                McpReply::Accepted => None,
                McpReply::Response { body, .. } => Some(body),
            }
        }
    };

    if let Some(reply) = reply {
        if !state.channels.send(&stream_id, SseEvent::message(reply.to_json())) {
            tracing::debug!("SSE stream {} closed before its reply was queued", stream_id);
        }
    }

    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn settings(public: Option<&str>) -> TransportSettings {
        TransportSettings {
            max_body_bytes: 1024,
            public_base_url: public.map(str::to_string),
            sse_keepalive: Duration::from_secs(15),
        }
    }

    #[test]
    fn test_endpoint_from_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("192.168.1.20:8787"));
        assert_eq!(
            message_endpoint(&settings(None), &headers, "abc"),
            "http://192.168.1.20:8787/sse/message?sessionId=abc"
        );
    }

    #[test]
    fn test_endpoint_prefers_public_base_url() {
        assert_eq!(
            message_endpoint(&settings(Some("https://phone.lan/")), &HeaderMap::new(), "abc"),
            "https://phone.lan/sse/message?sessionId=abc"
        );
    }

    #[tokio::test]
    async fn test_stream_guard_closes_session() {
        let channels = crate::mcp::SseChannels::new();
        let sessions = Arc::new(SessionManager::new());
        let (channel, _rx) = channels.open();
        let id = channel.id().to_string();
        sessions.open_with_id(id.clone(), "2025-11-25");

        drop(StreamGuard {
            channel,
            sessions: sessions.clone(),
        });
        assert!(sessions.get(&id).is_none());
        assert!(!channels.contains(&id));
    }
}
