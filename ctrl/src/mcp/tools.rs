//! MCP tool registry and the device tool catalogue

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::args::{self, Args};
use super::content::{CallToolResult, ContentBlock};
use super::jsonrpc::RpcError;
use crate::device::{AppInfo, Capabilities, DeviceError, DisplayInfo, SystemKey, UiElement};

/// Malformed `tools/call` requests. Device failures are not `ToolError`s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),
}

impl From<ToolError> for RpcError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidParams(msg) => RpcError::invalid_params(msg),
            ToolError::Internal(msg) => RpcError::internal(msg),
        }
    }
}

/// Context passed to tool calls
#[derive(Clone)]
pub struct ToolContext {
    pub caps: Capabilities,
    pub capture_timeout: Duration,
}

/// Trait for MCP tools
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (used in tools/call)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError>;
}

/// Registry of available MCP tools. Listing preserves registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn McpTool>>,
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool; a later registration with the same name replaces the earlier one
    pub fn register(&mut self, tool: Arc<dyn McpTool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// List all tools in MCP format
    pub fn list(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "inputSchema": t.input_schema()
                })
            })
            .collect()
    }

    /// Call a tool by name
    pub async fn call(
        &self,
        name: &str,
        args: &Args,
        ctx: &ToolContext,
    ) -> Result<CallToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::InvalidParams(format!("Unknown tool: {}", name)))?;

        tool.call(args, ctx).await
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool count
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Schema helpers
// ============================================================================

fn empty_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false
    })
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

fn coordinate() -> Value {
    json!({ "type": "integer", "minimum": 0 })
}

fn selector_properties() -> serde_json::Map<String, Value> {
    let string = json!({ "type": "string" });
    let boolean = json!({ "type": "boolean" });
    let mut props = serde_json::Map::new();
    for key in ["text", "contentDescription", "viewId", "className", "packageName"] {
        props.insert(key.to_string(), string.clone());
    }
    for key in ["clickable", "editable", "enabled"] {
        props.insert(key.to_string(), boolean.clone());
    }
    props
}

fn duration_arg(args: &Args, default_ms: i64) -> Result<Duration, ToolError> {
    let ms = args::opt_i64(args, "durationMs").unwrap_or(default_ms);
    if ms < 0 {
        return Err(ToolError::InvalidParams(
            "arguments.durationMs must not be negative".to_string(),
        ));
    }
    Ok(Duration::from_millis(ms as u64))
}

/// Display geometry, or the domain error to hand back when it cannot be read
async fn display_or_error(ctx: &ToolContext) -> Result<DisplayInfo, CallToolResult> {
    ctx.caps
        .display
        .display_info()
        .await
        .map_err(|e| CallToolResult::error(format!("Display info unavailable: {}", e)))
}

fn count_elements(el: &UiElement) -> usize {
    1 + el.children.iter().map(count_elements).sum::<usize>()
}

/// Installed-app filter: hide system apps unless requested, then match the
/// query against "label packageName" case-insensitively; sorted by label.
pub fn filter_installed(
    mut apps: Vec<AppInfo>,
    include_system: bool,
    query: Option<&str>,
) -> Vec<AppInfo> {
    let query = query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    apps.retain(|app| {
        if !include_system && app.is_system {
            return false;
        }
        match &query {
            None => true,
            Some(q) => format!("{} {}", app.label, app.package_name)
                .to_lowercase()
                .contains(q.as_str()),
        }
    });
    apps.sort_by_key(|app| app.label.to_lowercase());
    apps
}

// ============================================================================
// Device tools
// ============================================================================

pub struct DisplayInfoTool;

#[async_trait]
impl McpTool for DisplayInfoTool {
    fn name(&self) -> &str {
        "device.display_info"
    }

    fn description(&self) -> &str {
        "Get display size, density, and rotation"
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn call(&self, _args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let info = match display_or_error(ctx).await {
            Ok(info) => info,
            Err(result) => return Ok(result),
        };
        let structured =
            serde_json::to_value(info).map_err(|e| ToolError::Internal(e.to_string()))?;
        Ok(CallToolResult::text(structured.to_string()).with_structured(structured))
    }
}

pub struct ScreenCaptureTool;

#[async_trait]
impl McpTool for ScreenCaptureTool {
    fn name(&self) -> &str {
        "screen.capture"
    }

    fn description(&self) -> &str {
        "Capture a PNG screenshot"
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn call(&self, _args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let info = match display_or_error(ctx).await {
            Ok(info) => info,
            Err(result) => return Ok(result),
        };
        match ctx.caps.screen.capture_png(ctx.capture_timeout).await {
            Ok(png) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(png);
                Ok(CallToolResult::success(vec![
                    ContentBlock::png(encoded),
                    ContentBlock::text(format!(
                        "Captured {}x{} rotation={}",
                        info.width_px, info.height_px, info.rotation
                    )),
                ])
                .with_structured(json!({
                    "widthPx": info.width_px,
                    "heightPx": info.height_px,
                    "rotation": info.rotation,
                })))
            }
            Err(e) => Ok(CallToolResult::error(format!("Screen capture unavailable: {}", e))),
        }
    }
}

fn package_schema() -> Value {
    object_schema(
        json!({ "packageName": { "type": "string" } }),
        &["packageName"],
    )
}

pub struct AppLaunchTool;

#[async_trait]
impl McpTool for AppLaunchTool {
    fn name(&self) -> &str {
        "app.launch"
    }

    fn description(&self) -> &str {
        "Launch an app by package name"
    }

    fn input_schema(&self) -> Value {
        package_schema()
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let pkg = args::req_str(args, "packageName")?;
        Ok(match ctx.caps.apps.launch(&pkg).await {
            Ok(()) => CallToolResult::text(format!("Launched {}", pkg)),
            Err(DeviceError::Unavailable(msg)) => CallToolResult::error(msg),
            Err(_) => {
                CallToolResult::error(format!("Unable to launch {}. Is it installed?", pkg))
            }
        })
    }
}

pub struct AppIsInstalledTool;

#[async_trait]
impl McpTool for AppIsInstalledTool {
    fn name(&self) -> &str {
        "app.is_installed"
    }

    fn description(&self) -> &str {
        "Check if an app package is installed"
    }

    fn input_schema(&self) -> Value {
        package_schema()
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let pkg = args::req_str(args, "packageName")?;
        Ok(match ctx.caps.apps.is_installed(&pkg).await {
            Ok(installed) => CallToolResult::text(format!("{} installed={}", pkg, installed))
                .with_structured(json!({ "packageName": pkg, "installed": installed })),
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

pub struct AppListLaunchableTool;

#[async_trait]
impl McpTool for AppListLaunchableTool {
    fn name(&self) -> &str {
        "app.list_launchable"
    }

    fn description(&self) -> &str {
        "List launchable app package names"
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn call(&self, _args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        Ok(match ctx.caps.apps.launchable_packages().await {
            Ok(mut packages) => {
                packages.sort();
                packages.dedup();
                CallToolResult::text(format!("{} launchable packages", packages.len()))
                    .with_structured(json!({ "packages": packages }))
            }
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

pub struct AppListInstalledTool;

#[async_trait]
impl McpTool for AppListInstalledTool {
    fn name(&self) -> &str {
        "app.list_installed"
    }

    fn description(&self) -> &str {
        "List installed apps (optionally filter by query)"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "query": { "type": "string" },
                "includeSystem": { "type": "boolean" }
            }),
            &[],
        )
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let query = args::opt_str(args, "query");
        let include_system = args::opt_bool(args, "includeSystem").unwrap_or(false);
        Ok(match ctx.caps.apps.installed_apps().await {
            Ok(apps) => {
                let apps = filter_installed(apps, include_system, query.as_deref());
                CallToolResult::text(format!("{} installed apps", apps.len()))
                    .with_structured(json!({ "apps": apps }))
            }
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

pub struct CurrentAppTool;

#[async_trait]
impl McpTool for CurrentAppTool {
    fn name(&self) -> &str {
        "device.current_app"
    }

    fn description(&self) -> &str {
        "Get current foreground app package (from accessibility)"
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn call(&self, _args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let pkg = match ctx.caps.ui.root().await {
            Ok(root) => root.package_name,
            Err(e) => {
                tracing::debug!("current_app: no UI root: {}", e);
                None
            }
        };
        let text = format!("currentApp={}", pkg.as_deref().unwrap_or("unknown"));
        let mut result = CallToolResult::text(text).with_structured(json!({ "packageName": pkg }));
        result.is_error = pkg.is_none();
        Ok(result)
    }
}

pub struct UiTreeTool;

#[async_trait]
impl McpTool for UiTreeTool {
    fn name(&self) -> &str {
        "ui.tree"
    }

    fn description(&self) -> &str {
        "Get UI element tree with positions and text"
    }

    fn input_schema(&self) -> Value {
        empty_schema()
    }

    async fn call(&self, _args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        Ok(match ctx.caps.ui.root().await {
            Ok(root) => CallToolResult::text(format!(
                "UI tree captured with {} elements",
                count_elements(&root)
            ))
            .with_structured(json!({ "elements": [root.to_json()] })),
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

pub struct UiFindTool;

#[async_trait]
impl McpTool for UiFindTool {
    fn name(&self) -> &str {
        "ui.find"
    }

    fn description(&self) -> &str {
        "Find UI elements by selector"
    }

    fn input_schema(&self) -> Value {
        let mut props = selector_properties();
        props.insert("limit".to_string(), json!({ "type": "integer" }));
        object_schema(Value::Object(props), &[])
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let selector = args::selector(args);
        let limit = args::opt_i64(args, "limit").unwrap_or(20).clamp(1, 200) as usize;
        let root = match ctx.caps.ui.root().await {
            Ok(root) => root,
            Err(e) => return Ok(CallToolResult::error(e.to_string())),
        };
        let elements: Vec<Value> = selector
            .find(&root, limit)
            .into_iter()
            .map(UiElement::to_json)
            .collect();
        Ok(
            CallToolResult::text(format!("Found {} elements", elements.len()))
                .with_structured(json!({ "elements": elements })),
        )
    }
}

pub struct UiClickTool;

#[async_trait]
impl McpTool for UiClickTool {
    fn name(&self) -> &str {
        "ui.click"
    }

    fn description(&self) -> &str {
        "Click a UI element by selector"
    }

    fn input_schema(&self) -> Value {
        let mut props = selector_properties();
        props.insert("index".to_string(), json!({ "type": "integer" }));
        object_schema(Value::Object(props), &[])
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let selector = args::selector(args);
        let index = args::opt_i64(args, "index").unwrap_or(0);
        let root = match ctx.caps.ui.root().await {
            Ok(root) => root,
            Err(e) => return Ok(CallToolResult::error(e.to_string())),
        };
        let matches = selector.find(&root, 50);
        let target = usize::try_from(index).ok().and_then(|i| matches.get(i));
        let Some(target) = target else {
            return Ok(CallToolResult::error("No matching element for selector"));
        };
        Ok(match ctx.caps.ui.click(target).await {
            Ok(()) => CallToolResult::text("Clicked element"),
            Err(e) => CallToolResult::error(format!("Failed to click element: {}", e)),
        })
    }
}

pub struct TapTool;

#[async_trait]
impl McpTool for TapTool {
    fn name(&self) -> &str {
        "input.tap"
    }

    fn description(&self) -> &str {
        "Tap a point on screen (pixel coordinates)"
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({ "x": coordinate(), "y": coordinate() }), &["x", "y"])
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let x = args::req_i64(args, "x")?;
        let y = args::req_i64(args, "y")?;
        let info = match display_or_error(ctx).await {
            Ok(info) => info,
            Err(result) => return Ok(result),
        };
        if !info.contains(x, y) {
            return Ok(CallToolResult::error(format!(
                "Tap out of bounds: ({},{}) for {}x{}",
                x, y, info.width_px, info.height_px
            )));
        }
        Ok(match ctx.caps.input.tap(x, y).await {
            Ok(()) => CallToolResult::text(format!("Tapped ({},{})", x, y)),
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

pub struct LongPressTool;

#[async_trait]
impl McpTool for LongPressTool {
    fn name(&self) -> &str {
        "input.longPress"
    }

    fn description(&self) -> &str {
        "Long press a point on screen"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "x": coordinate(),
                "y": coordinate(),
                "durationMs": { "type": "integer", "minimum": 100, "default": 500 }
            }),
            &["x", "y"],
        )
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let x = args::req_i64(args, "x")?;
        let y = args::req_i64(args, "y")?;
        let duration = duration_arg(args, 500)?;
        let info = match display_or_error(ctx).await {
            Ok(info) => info,
            Err(result) => return Ok(result),
        };
        if !info.contains(x, y) {
            return Ok(CallToolResult::error(format!(
                "Long press out of bounds: ({},{}) for {}x{}",
                x, y, info.width_px, info.height_px
            )));
        }
        Ok(match ctx.caps.input.long_press(x, y, duration).await {
            Ok(()) => CallToolResult::text(format!(
                "Long pressed ({},{}) for {}ms",
                x,
                y,
                duration.as_millis()
            )),
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

pub struct SwipeTool;

#[async_trait]
impl McpTool for SwipeTool {
    fn name(&self) -> &str {
        "input.swipe"
    }

    fn description(&self) -> &str {
        "Swipe from one point to another"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "x1": coordinate(),
                "y1": coordinate(),
                "x2": coordinate(),
                "y2": coordinate(),
                "durationMs": { "type": "integer", "minimum": 100, "default": 300 }
            }),
            &["x1", "y1", "x2", "y2"],
        )
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let x1 = args::req_i64(args, "x1")?;
        let y1 = args::req_i64(args, "y1")?;
        let x2 = args::req_i64(args, "x2")?;
        let y2 = args::req_i64(args, "y2")?;
        let duration = duration_arg(args, 300)?;
        let info = match display_or_error(ctx).await {
            Ok(info) => info,
            Err(result) => return Ok(result),
        };
        if !info.contains(x1, y1) || !info.contains(x2, y2) {
            return Ok(CallToolResult::error("Swipe coordinates out of bounds"));
        }
        Ok(
            match ctx.caps.input.swipe((x1, y1), (x2, y2), duration).await {
                Ok(()) => CallToolResult::text(format!(
                    "Swiped from ({},{}) to ({},{}) in {}ms",
                    x1,
                    y1,
                    x2,
                    y2,
                    duration.as_millis()
                )),
                Err(e) => CallToolResult::error(e.to_string()),
            },
        )
    }
}

pub struct KeyTool;

#[async_trait]
impl McpTool for KeyTool {
    fn name(&self) -> &str {
        "input.key"
    }

    fn description(&self) -> &str {
        "Press a system key (back, home, recents)"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "key": { "type": "string", "enum": ["back", "home", "recents"] }
            }),
            &["key"],
        )
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let raw = args::req_str(args, "key")?;
        let key = match raw.parse::<SystemKey>() {
            Ok(key) => key,
            Err(msg) => return Ok(CallToolResult::error(msg)),
        };
        Ok(match ctx.caps.input.press_key(key).await {
            Ok(()) => CallToolResult::text(format!("Pressed {} key", key.as_str())),
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

pub struct TextInputTool;

#[async_trait]
impl McpTool for TextInputTool {
    fn name(&self) -> &str {
        "input.text"
    }

    fn description(&self) -> &str {
        "Set text in the focused input field"
    }

    fn input_schema(&self) -> Value {
        object_schema(json!({ "text": { "type": "string" } }), &["text"])
    }

    async fn call(&self, args: &Args, ctx: &ToolContext) -> Result<CallToolResult, ToolError> {
        let text = args::req_str(args, "text")?;
        Ok(match ctx.caps.input.set_text(&text).await {
            Ok(()) => CallToolResult::text("Text set"),
            Err(DeviceError::NotFound(_)) => {
                CallToolResult::error("Unable to set text. Focus an input field first.")
            }
            Err(e) => CallToolResult::error(e.to_string()),
        })
    }
}

/// Register the device control catalogue, in listing order
pub fn register_device_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(DisplayInfoTool));
    registry.register(Arc::new(ScreenCaptureTool));
    registry.register(Arc::new(AppLaunchTool));
    registry.register(Arc::new(AppIsInstalledTool));
    registry.register(Arc::new(AppListLaunchableTool));
    registry.register(Arc::new(AppListInstalledTool));
    registry.register(Arc::new(CurrentAppTool));
    registry.register(Arc::new(UiTreeTool));
    registry.register(Arc::new(UiFindTool));
    registry.register(Arc::new(UiClickTool));
    registry.register(Arc::new(TapTool));
    registry.register(Arc::new(LongPressTool));
    registry.register(Arc::new(SwipeTool));
    registry.register(Arc::new(KeyTool));
    registry.register(Arc::new(TextInputTool));
}
