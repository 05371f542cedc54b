use crate::config::Config;
use crate::device::Capabilities;
use crate::mcp::{register_device_tools, McpHandler, SessionManager, SseChannels, ToolContext, ToolRegistry};
use crate::security::{allowlist_middleware, AllowlistGate, AllowlistStore, RateLimiter};
use crate::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Upper bound on how often the maintenance task runs
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Transport settings read by request handlers
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub max_body_bytes: usize,
    pub public_base_url: Option<String>,
    pub sse_keepalive: Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<McpHandler>,
    pub sessions: Arc<SessionManager>,
    pub channels: SseChannels,
    pub limiter: Arc<RateLimiter>,
    pub allowlist: AllowlistStore,
    pub settings: Arc<TransportSettings>,
    pub metrics: Option<PrometheusHandle>,
    pub shutdown: CancellationToken,
}

pub struct GatewayServer {
    state: AppState,
    bind_addr: String,
    grace: Duration,
    idle_timeout: Option<Duration>,
}

impl GatewayServer {
    pub fn new(config: &Config, caps: Capabilities, allowlist: AllowlistStore) -> Self {
        let sessions = Arc::new(SessionManager::new());
        let mut tool_registry = ToolRegistry::new();
        register_device_tools(&mut tool_registry);
        let tool_registry = Arc::new(tool_registry);
        let ctx = ToolContext {
            caps,
            capture_timeout: config.mcp.capture_timeout(),
        };
        let handler = Arc::new(McpHandler::new(tool_registry, sessions.clone(), ctx));

        let state = AppState {
            handler,
            sessions,
            channels: SseChannels::new(),
            limiter: Arc::new(RateLimiter::new(config.security.rate_limit)),
            allowlist,
            settings: Arc::new(TransportSettings {
                max_body_bytes: config.server.max_body_bytes,
                public_base_url: config.server.public_base_url.clone(),
                sse_keepalive: config.mcp.sse_keepalive(),
            }),
            metrics: None,
            shutdown: CancellationToken::new(),
        };

        Self {
            state,
            bind_addr: config.server.bind_addr.clone(),
            grace: config.server.shutdown_grace(),
            idle_timeout: config.mcp.session_idle_timeout(),
        }
    }

    /// Serve `GET /metrics` from an installed Prometheus recorder
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// GET /metrics - Prometheus text format
    async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
        match &state.metrics {
            Some(handle) => (StatusCode::OK, handle.render()).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    pub fn router(&self) -> Router {
        let store = self.state.allowlist.clone();

        // Streamable HTTP: blocked callers are recorded for the operator
        let mcp_routes = Router::new()
            .route(
                "/mcp",
                post(super::streamable::post_mcp)
                    .get(super::streamable::get_mcp)
                    .delete(super::streamable::delete_mcp),
            )
            .route_layer(axum::middleware::from_fn_with_state(
                AllowlistGate::recording(store.clone()),
                allowlist_middleware,
            ));

        let sse_routes = Router::new()
            .route("/sse", get(super::sse::subscribe))
            .route("/sse/message", post(super::sse::post_message))
            .route("/metrics", get(Self::metrics_handler))
            .route_layer(axum::middleware::from_fn_with_state(
                AllowlistGate::silent(store),
                allowlist_middleware,
            ));

        Router::new()
            .merge(mcp_routes)
            .merge(sse_routes)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves, then
    /// close every SSE stream and wait at most the grace period for
    /// in-flight requests
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!("MCP gateway listening on {}", addr);

        let token = self.state.shutdown.clone();
        let maintenance = tokio::spawn(run_maintenance(
            self.state.sessions.clone(),
            self.state.limiter.clone(),
            self.idle_timeout,
            token.clone(),
        ));

        let channels = self.state.channels.clone();
        let signal_token = token.clone();
        let graceful = async move {
            shutdown.await;
            tracing::info!("Shutting down MCP gateway");
            signal_token.cancel();
            channels.close_all();
        };

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .into_future();
        tokio::pin!(server);

        let grace = self.grace;
        let deadline = async move {
            token.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            res = &mut server => {
                res.map_err(|e| crate::Error::Server(e.to_string()))?;
            }
            _ = deadline => {
                tracing::warn!("Shutdown grace period of {:?} elapsed; dropping open connections", grace);
            }
        }

        maintenance.abort();
        tracing::info!("MCP gateway stopped");
        Ok(())
    }
}

async fn run_maintenance(
    sessions: Arc<SessionManager>,
    limiter: Arc<RateLimiter>,
    idle_timeout: Option<Duration>,
    token: CancellationToken,
) {
    let period = idle_timeout
        .map(|t| t.min(MAINTENANCE_INTERVAL).max(Duration::from_secs(1)))
        .unwrap_or(MAINTENANCE_INTERVAL);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                limiter.prune(Instant::now());
                if let Some(max_idle) = idle_timeout {
                    sessions.evict_idle(max_idle);
                }
            }
        }
    }
}
