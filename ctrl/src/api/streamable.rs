//! Streamable HTTP transport: one POST per JSON-RPC call

use axum::{
    body::{Body, Bytes},
    extract::{Extension, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::server::AppState;
use crate::mcp::jsonrpc::{Envelope, JsonRpcResponse, RpcError, INTERNAL_ERROR, SESSION_NOT_FOUND};
use crate::mcp::session::{CloseOutcome, SessionRef, HEADER_PROTOCOL_VERSION, HEADER_SESSION_ID};
use crate::mcp::{CallContext, McpReply};
use crate::security::gate::{self, Rejection};
use crate::security::PeerAddr;

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Session headers of a request
pub(crate) fn session_ref(headers: &HeaderMap) -> SessionRef {
    SessionRef {
        session_id: header_string(headers, HEADER_SESSION_ID),
        protocol_version: header_string(headers, HEADER_PROTOCOL_VERSION),
    }
}

/// Read the whole body, refusing more than `limit` bytes
pub(crate) async fn read_body(body: Body, limit: usize) -> Result<Bytes, Rejection> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::debug!("Rejected request body: {}", e);
        Rejection::PayloadTooLarge
    })
}

pub(crate) fn parse_envelope(bytes: &[u8]) -> Result<Envelope, RpcError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| RpcError::parse_error("Body is not valid UTF-8"))?;
    Envelope::parse(text)
}

fn status_for(body: &JsonRpcResponse) -> StatusCode {
    match &body.error {
        None => StatusCode::OK,
        Some(err) if err.code == SESSION_NOT_FOUND => StatusCode::NOT_FOUND,
        Some(err) if err.code == INTERNAL_ERROR => StatusCode::INTERNAL_SERVER_ERROR,
        Some(_) => StatusCode::BAD_REQUEST,
    }
}

fn rpc_error_response(body: JsonRpcResponse) -> Response {
    (status_for(&body), Json(body)).into_response()
}

/// POST /mcp
pub async fn post_mcp(
    State(state): State<AppState>,
    Extension(peer): Extension<PeerAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if let Err(rejection) = gate::check_origin(&headers, &peer.text) {
        tracing::warn!("Rejected Origin {:?} from {}", headers.get(header::ORIGIN), peer.text);
        return rejection.into_response();
    }
    if !state.limiter.try_acquire(&peer.text) {
        tracing::warn!("Rate limited {}", peer.text);
        return Rejection::TooManyRequests.into_response();
    }
    let max_bytes = state.settings.max_body_bytes;
    if let Err(rejection) = gate::check_shape(&headers, max_bytes) {
        tracing::debug!("Rejected request shape from {}: {}", peer.text, rejection);
        return rejection.into_response();
    }

    let bytes = match read_body(body, max_bytes).await {
        Ok(bytes) => bytes,
        Err(rejection) => return rejection.into_response(),
    };

    let env = match parse_envelope(&bytes) {
        Ok(env) => env,
        Err(err) => return rpc_error_response(JsonRpcResponse::error(None, err)),
    };

    let call = CallContext {
        session: session_ref(&headers),
        stream_id: None,
    };

    match state.handler.handle(&env, &call).await {
        McpReply::Accepted => StatusCode::ACCEPTED.into_response(),
        McpReply::Response { body, session_id } => {
            let mut response = (status_for(&body), Json(body)).into_response();
            if let Some(sid) = session_id {
                match HeaderValue::from_str(&sid) {
                    Ok(value) => {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(HEADER_SESSION_ID), value);
                    }
                    Err(e) => tracing::error!("Session id {:?} is not a valid header: {}", sid, e),
                }
            }
            response
        }
    }
}

/// GET /mcp - server-initiated streams are not offered
pub async fn get_mcp() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST, DELETE")],
    )
        .into_response()
}

/// DELETE /mcp - terminate the session named by the session header
pub async fn delete_mcp(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(sid) = header_string(&headers, HEADER_SESSION_ID) else {
        return StatusCode::NOT_FOUND;
    };
    match state.sessions.close(&sid) {
        CloseOutcome::Closed => {
            tracing::info!("Closed MCP session {}", sid);
            StatusCode::OK
        }
        CloseOutcome::NotFound => StatusCode::NOT_FOUND,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::jsonrpc::{INVALID_PARAMS, PARSE_ERROR};
    use serde_json::json;

    fn error_body(code: i32) -> JsonRpcResponse {
        JsonRpcResponse::error(Some(json!(1)), RpcError::new(code, "x"))
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&JsonRpcResponse::success(json!(1), json!({}))),
            StatusCode::OK
        );
        assert_eq!(status_for(&error_body(SESSION_NOT_FOUND)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&error_body(INTERNAL_ERROR)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_for(&error_body(INVALID_PARAMS)), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&error_body(PARSE_ERROR)), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_session_ref_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_static(" abc "));
        headers.insert("mcp-protocol-version", HeaderValue::from_static(""));
        let r = session_ref(&headers);
        assert_eq!(r.session_id.as_deref(), Some("abc"));
        assert_eq!(r.protocol_version, None);
    }
}
