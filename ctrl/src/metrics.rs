//! Gateway observability metrics
//!
//! Emitted through the `metrics` facade; nothing is recorded unless the
//! binary installs a recorder (the Prometheus exporter).
//! - Access gate rejections by reason
//! - JSON-RPC requests by method and status, with handling duration
//! - Tool invocations by tool and outcome
//! - Live sessions and SSE streams

use std::time::Duration;

/// Methods reported under their own label; anything else is "other"
const KNOWN_METHODS: &[&str] = &[
    "initialize",
    "notifications/initialized",
    "ping",
    "tools/list",
    "tools/call",
];

fn method_label(method: &str) -> String {
    if KNOWN_METHODS.contains(&method) {
        method.to_string()
    } else {
        "other".to_string()
    }
}

/// Record a request rejected before protocol processing
pub fn record_gate_rejection(reason: &'static str) {
    metrics::counter!("ctrl_gate_rejections_total", "reason" => reason).increment(1);
}

/// Record a handled JSON-RPC call
pub fn record_rpc(method: &str, ok: bool, duration: Duration) {
    let method = method_label(method);
    metrics::counter!(
        "ctrl_rpc_requests_total",
        "method" => method.clone(),
        "status" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    metrics::histogram!("ctrl_rpc_duration_seconds", "method" => method)
        .record(duration.as_secs_f64());
}

/// Record a completed `tools/call`
pub fn record_tool_call(tool: &str, is_error: bool) {
    metrics::counter!(
        "ctrl_tool_calls_total",
        "tool" => tool.to_string(),
        "is_error" => if is_error { "true" } else { "false" }
    )
    .increment(1);
}

pub fn set_sessions_active(count: usize) {
    metrics::gauge!("ctrl_sessions_active").set(count as f64);
}

pub fn set_sse_streams_active(count: usize) {
    metrics::gauge!("ctrl_sse_streams_active").set(count as f64);
}
