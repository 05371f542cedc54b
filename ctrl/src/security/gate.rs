//! Access checks applied before any protocol processing

use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

/// A request refused by the gate. Answered with a bare status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("forbidden")]
    Forbidden,
    #[error("too many requests")]
    TooManyRequests,
    #[error("not acceptable")]
    NotAcceptable,
    #[error("unsupported media type")]
    UnsupportedMediaType,
    #[error("payload too large")]
    PayloadTooLarge,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Forbidden => StatusCode::FORBIDDEN,
            Rejection::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Rejection::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Rejection::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Rejection::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Forbidden => "forbidden",
            Rejection::TooManyRequests => "rate_limited",
            Rejection::NotAcceptable => "not_acceptable",
            Rejection::UnsupportedMediaType => "unsupported_media_type",
            Rejection::PayloadTooLarge => "payload_too_large",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        crate::metrics::record_gate_rejection(self.reason());
        self.status().into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// An `Origin` header, when present, must be http(s) with the caller's
/// numeric address as host
pub fn check_origin(headers: &HeaderMap, remote: &str) -> Result<(), Rejection> {
    let Some(raw) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let origin = raw.to_str().map_err(|_| Rejection::Forbidden)?.trim();
    if origin.is_empty() {
        return Ok(());
    }

    let uri: Uri = origin.parse().map_err(|_| Rejection::Forbidden)?;
    let scheme_ok = uri
        .scheme_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("https"));
    if scheme_ok && uri.host() == Some(remote) {
        Ok(())
    } else {
        Err(Rejection::Forbidden)
    }
}

/// `Accept` must allow JSON, event streams, or anything
pub fn check_accept(headers: &HeaderMap) -> Result<(), Rejection> {
    let accept = header_str(headers, header::ACCEPT)
        .unwrap_or("")
        .to_ascii_lowercase();
    if accept.contains("application/json")
        || accept.contains("*/*")
        || accept.contains("text/event-stream")
    {
        Ok(())
    } else {
        Err(Rejection::NotAcceptable)
    }
}

/// `Content-Type` must be `application/json`, parameters allowed
pub fn check_content_type(headers: &HeaderMap) -> Result<(), Rejection> {
    let mime = header_str(headers, header::CONTENT_TYPE)
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("application/json") => Ok(()),
        _ => Err(Rejection::UnsupportedMediaType),
    }
}

/// A declared `Content-Length` must not exceed `max_bytes`
pub fn check_content_length(headers: &HeaderMap, max_bytes: usize) -> Result<(), Rejection> {
    let declared = header_str(headers, header::CONTENT_LENGTH).and_then(|v| v.trim().parse::<u64>().ok());
    match declared {
        Some(len) if len > max_bytes as u64 => Err(Rejection::PayloadTooLarge),
        _ => Ok(()),
    }
}

/// Transport-shape checks for a Streamable HTTP call, in order
pub fn check_shape(headers: &HeaderMap, max_bytes: usize) -> Result<(), Rejection> {
    check_accept(headers)?;
    check_content_type(headers)?;
    check_content_length(headers, max_bytes)
}
