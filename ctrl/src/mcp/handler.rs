//! MCP JSON-RPC 2.0 handler

use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::jsonrpc::{Envelope, JsonRpcResponse, RpcError};
use super::session::{negotiate_version, SessionManager, SessionRef};
use super::tools::{ToolContext, ToolRegistry};

/// Transport-side facts about one inbound call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Session headers presented with the call
    pub session: SessionRef,
    /// Set when the call arrived through an SSE stream
    pub stream_id: Option<String>,
}

impl CallContext {
    /// Calls on an SSE stream without a session header belong to the stream's session
    fn effective_session(&self) -> SessionRef {
        let mut session = self.session.clone();
        if session.session_id.is_none() {
            session.session_id = self.stream_id.clone();
        }
        session
    }
}

/// What the transport should send back
#[derive(Debug, Clone, PartialEq)]
pub enum McpReply {
    /// Notification or stray response: no body
    Accepted,
    Response {
        body: JsonRpcResponse,
        /// Set by `initialize`; returned in the session header
        session_id: Option<String>,
    },
}

impl McpReply {
    fn error(id: Option<&Value>, err: RpcError) -> Self {
        McpReply::Response {
            body: JsonRpcResponse::error(id.cloned(), err),
            session_id: None,
        }
    }
}

/// MCP protocol handler
pub struct McpHandler {
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionManager>,
    ctx: ToolContext,
}

impl McpHandler {
    pub fn new(tools: Arc<ToolRegistry>, sessions: Arc<SessionManager>, ctx: ToolContext) -> Self {
        Self {
            tools,
            sessions,
            ctx,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Handle one parsed envelope
    pub async fn handle(&self, env: &Envelope, call: &CallContext) -> McpReply {
        if !env.is_version2() {
            return McpReply::error(env.id(), RpcError::invalid_request("Expected jsonrpc=2.0"));
        }
        if env.is_response_shaped() {
            tracing::debug!("Discarding client-sent JSON-RPC response");
            return McpReply::Accepted;
        }
        let Some(method) = env.method() else {
            return McpReply::error(env.id(), RpcError::invalid_request("Missing method"));
        };

        let Some(id) = env.id().cloned() else {
            self.handle_notification(method, call);
            return McpReply::Accepted;
        };

        let started = Instant::now();
        let outcome = match method {
            "initialize" => self.handle_initialize(env.params(), call),
            "ping" => self.handle_ping(call).map(|r| (r, None)),
            "tools/list" => self.handle_tools_list(call).map(|r| (r, None)),
            "tools/call" => self
                .handle_tools_call(env.params(), call)
                .await
                .map(|r| (r, None)),
            other => Err(RpcError::method_not_found(format!("Unknown method: {}", other))),
        };
        crate::metrics::record_rpc(method, outcome.is_ok(), started.elapsed());

        match outcome {
            Ok((result, session_id)) => McpReply::Response {
                body: JsonRpcResponse::success(id, result),
                session_id,
            },
            Err(err) => {
                tracing::debug!("{} failed: {} ({})", method, err.message, err.code);
                McpReply::error(Some(&id), err)
            }
        }
    }

    fn handle_notification(&self, method: &str, call: &CallContext) {
        match method {
            "notifications/initialized" => {
                if let Err(err) = self.sessions.mark_initialized(&call.effective_session()) {
                    tracing::warn!("Dropped notifications/initialized: {}", err.message);
                }
            }
            other => tracing::debug!("Ignoring notification {}", other),
        }
    }

    fn handle_initialize(
        &self,
        params: Option<&Map<String, Value>>,
        call: &CallContext,
    ) -> Result<(Value, Option<String>), RpcError> {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("Missing params.protocolVersion"))?;

        let version = negotiate_version(requested);
        let session = match &call.stream_id {
            Some(stream_id) => self.sessions.open_with_id(stream_id.clone(), version),
            None => self.sessions.open(version),
        };
        tracing::info!(
            "Opened MCP session {} (protocol {})",
            session.id,
            session.protocol_version
        );

        let result = json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": "ctrl-phone",
                "title": "CTRL Phone",
                "version": env!("CARGO_PKG_VERSION"),
                "description": "Remote control of this device over MCP"
            },
            "instructions": "Call tools/list to discover device tools. Coordinates are screen pixels; use device.display_info for bounds."
        });
        Ok((result, Some(session.id)))
    }

    fn handle_ping(&self, call: &CallContext) -> Result<Value, RpcError> {
        self.sessions.touch(&call.effective_session())?;
        Ok(json!({}))
    }

    fn handle_tools_list(&self, call: &CallContext) -> Result<Value, RpcError> {
        self.sessions.touch_initialized(&call.effective_session())?;
        Ok(json!({ "tools": self.tools.list() }))
    }

    async fn handle_tools_call(
        &self,
        params: Option<&Map<String, Value>>,
        call: &CallContext,
    ) -> Result<Value, RpcError> {
        self.sessions.touch_initialized(&call.effective_session())?;

        let params = params.ok_or_else(|| RpcError::invalid_params("Missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("Missing params.name"))?;
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(RpcError::invalid_params("params.arguments must be an object")),
        };

        let outcome = AssertUnwindSafe(self.tools.call(name, &arguments, &self.ctx))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!("Tool {} panicked", name);
                return Err(RpcError::internal("Internal error"));
            }
        };
        crate::metrics::record_tool_call(name, result.is_error);

        serde_json::to_value(&result).map_err(|e| {
            tracing::error!("Failed to encode result of {}: {}", name, e);
            RpcError::internal("Internal error")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, DisplayInfo, HeadlessDevice};
    use crate::mcp::content::CallToolResult;
    use crate::mcp::jsonrpc::{
        INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, SESSION_NOT_FOUND,
    };
    use crate::mcp::tools::{register_device_tools, McpTool, ToolError};
    use async_trait::async_trait;
    use std::time::Duration;

    struct PanickingTool;

    #[async_trait]
    impl McpTool for PanickingTool {
        fn name(&self) -> &str {
            "test.panic"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn call(
            &self,
            _args: &Map<String, Value>,
            _ctx: &ToolContext,
        ) -> Result<CallToolResult, ToolError> {
            panic!("tool exploded");
        }
    }

    fn handler() -> McpHandler {
        let mut registry = ToolRegistry::new();
        register_device_tools(&mut registry);
        registry.register(Arc::new(PanickingTool));
        let device = HeadlessDevice::new(DisplayInfo {
            width_px: 1080,
            height_px: 2400,
            density_dpi: 420,
            rotation: 0,
        });
        McpHandler::new(
            Arc::new(registry),
            Arc::new(SessionManager::new()),
            ToolContext {
                caps: Capabilities::from_backend(Arc::new(device)),
                capture_timeout: Duration::from_millis(50),
            },
        )
    }

    fn env(v: Value) -> Envelope {
        Envelope::parse(&v.to_string()).unwrap()
    }

    fn with_session(id: &str) -> CallContext {
        CallContext {
            session: SessionRef {
                session_id: Some(id.to_string()),
                protocol_version: None,
            },
            stream_id: None,
        }
    }

    fn expect_response(reply: McpReply) -> (JsonRpcResponse, Option<String>) {
        match reply {
            McpReply::Response { body, session_id } => (body, session_id),
            McpReply::Accepted => panic!("expected a response"),
        }
    }

    fn error_code(reply: McpReply) -> i32 {
        expect_response(reply).0.error.expect("error response").code
    }

    async fn initialize(h: &McpHandler, version: &str) -> (Value, String) {
        let reply = h
            .handle(
                &env(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": {"protocolVersion": version}})),
                &CallContext::default(),
            )
            .await;
        let (body, sid) = expect_response(reply);
        (body.result.expect("result"), sid.expect("session id"))
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let h = handler();
        let (result, sid) = initialize(&h, "2025-03-26").await;
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], "ctrl-phone");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert!(h.sessions().get(&sid).is_some());

        let (result, _) = initialize(&h, "1999-01-01").await;
        assert_eq!(result["protocolVersion"], "2025-11-25");
    }

    #[tokio::test]
    async fn test_initialize_requires_protocol_version() {
        let h = handler();
        let reply = h
            .handle(
                &env(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})),
                &CallContext::default(),
            )
            .await;
        assert_eq!(error_code(reply), INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_handshake_gates_tools() {
        let h = handler();
        let (_, sid) = initialize(&h, "2025-11-25").await;
        let list = env(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));

        let reply = h.handle(&list, &with_session(&sid)).await;
        let (body, _) = expect_response(reply);
        let err = body.error.unwrap();
        assert_eq!(err.code, INVALID_REQUEST);
        assert_eq!(err.message, "Server not initialized");

        // ping works before the handshake completes
        let ping = env(json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}));
        let (body, _) = expect_response(h.handle(&ping, &with_session(&sid)).await);
        assert_eq!(body.result, Some(json!({})));

        let note = env(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        assert_eq!(h.handle(&note, &with_session(&sid)).await, McpReply::Accepted);

        let (body, _) = expect_response(h.handle(&list, &with_session(&sid)).await);
        assert_eq!(body.id, json!(2));
        assert_eq!(body.result.unwrap()["tools"].as_array().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_unknown_session_and_missing_header() {
        let h = handler();
        let ping = env(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
        assert_eq!(error_code(h.handle(&ping, &with_session("nope")).await), SESSION_NOT_FOUND);
        assert_eq!(
            error_code(h.handle(&ping, &CallContext::default()).await),
            INVALID_REQUEST
        );
    }

    #[tokio::test]
    async fn test_protocol_version_header_must_match() {
        let h = handler();
        let (_, sid) = initialize(&h, "2024-11-05").await;
        let mut call = with_session(&sid);
        call.session.protocol_version = Some("2025-11-25".to_string());
        let ping = env(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
        let (body, _) = expect_response(h.handle(&ping, &call).await);
        assert_eq!(body.error.unwrap().message, "Unsupported mcp-protocol-version");
    }

    #[tokio::test]
    async fn test_envelope_checks() {
        let h = handler();
        let ctx = CallContext::default();

        let reply = h.handle(&env(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"})), &ctx).await;
        let (body, _) = expect_response(reply);
        assert_eq!(body.id, json!(1));
        assert_eq!(body.error.unwrap().message, "Expected jsonrpc=2.0");

        let stray = env(json!({"jsonrpc": "2.0", "id": 9, "result": {}}));
        assert_eq!(h.handle(&stray, &ctx).await, McpReply::Accepted);

        let no_method = env(json!({"jsonrpc": "2.0", "id": 4}));
        assert_eq!(error_code(h.handle(&no_method, &ctx).await), INVALID_REQUEST);

        let unknown = env(json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"}));
        let (body, _) = expect_response(h.handle(&unknown, &ctx).await);
        let err = body.error.unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert_eq!(err.message, "Unknown method: resources/list");

        // unknown and failing notifications are swallowed
        let note = env(json!({"jsonrpc": "2.0", "method": "notifications/cancelled"}));
        assert_eq!(h.handle(&note, &ctx).await, McpReply::Accepted);
        let note = env(json!({"jsonrpc": "2.0", "id": null, "method": "notifications/initialized"}));
        assert_eq!(h.handle(&note, &ctx).await, McpReply::Accepted);
    }

    #[tokio::test]
    async fn test_stream_binds_session() {
        let h = handler();
        let stream = CallContext {
            session: SessionRef::default(),
            stream_id: Some("stream-1".to_string()),
        };
        let init = env(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {"protocolVersion": "2025-03-26"}}));
        let (_, sid) = expect_response(h.handle(&init, &stream).await);
        assert_eq!(sid.as_deref(), Some("stream-1"));

        let note = env(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        h.handle(&note, &stream).await;
        assert!(h.sessions().get("stream-1").unwrap().initialized);

        let list = env(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));
        let (body, _) = expect_response(h.handle(&list, &stream).await);
        assert!(body.error.is_none());
    }

    #[tokio::test]
    async fn test_tools_call_outcomes() {
        let h = handler();
        let (_, sid) = initialize(&h, "2025-11-25").await;
        let note = env(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        h.handle(&note, &with_session(&sid)).await;

        let tap = env(json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call",
            "params": {"name": "input.tap", "arguments": {"x": -1, "y": 5}}}));
        let (body, _) = expect_response(h.handle(&tap, &with_session(&sid)).await);
        let result = body.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("out of bounds"));

        let missing = env(json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call",
            "params": {"name": "input.tap", "arguments": {"x": 1}}}));
        let (body, _) = expect_response(h.handle(&missing, &with_session(&sid)).await);
        let err = body.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.message, "Missing arguments.y");

        let bad_args = env(json!({"jsonrpc": "2.0", "id": 9, "method": "tools/call",
            "params": {"name": "input.tap", "arguments": [1, 2]}}));
        assert_eq!(error_code(h.handle(&bad_args, &with_session(&sid)).await), INVALID_PARAMS);

        let boom = env(json!({"jsonrpc": "2.0", "id": 10, "method": "tools/call",
            "params": {"name": "test.panic"}}));
        assert_eq!(error_code(h.handle(&boom, &with_session(&sid)).await), INTERNAL_ERROR);

        // the handler stays usable after a panic
        let ping = env(json!({"jsonrpc": "2.0", "id": 11, "method": "ping"}));
        let (body, _) = expect_response(h.handle(&ping, &with_session(&sid)).await);
        assert!(body.error.is_none());
    }
}
