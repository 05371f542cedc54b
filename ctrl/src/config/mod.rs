//! Configuration management for the ctrl gateway
//!
//! Default config location: ./ctrl.toml

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Base URL advertised in the SSE `endpoint` event.
    /// When unset, it is derived from the request's Host header.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Maximum JSON-RPC body size in bytes (default: 4MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// How long in-flight requests may run after shutdown was requested
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024 // 4MiB
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: None,
            max_body_bytes: default_max_body_bytes(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub allowlist: AllowlistSettings,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Initial allowlist state handed to the allowlist store at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AllowlistSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// IPv4 addresses or CIDR blocks, e.g. "192.168.1.20" or "10.0.0.0/8"
    #[serde(default)]
    pub entries: Vec<String>,
}

impl Default for AllowlistSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_capacity")]
    pub capacity: f64,
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

fn default_rate_capacity() -> f64 {
    20.0
}

fn default_refill_per_sec() -> f64 {
    10.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_rate_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpConfig {
    /// Interval between SSE keep-alive comments
    #[serde(default = "default_keepalive_secs")]
    pub sse_keepalive_secs: u64,
    /// Timeout handed to the screen capture backend
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    /// Evict sessions idle for longer than this. Unset = sessions live until closed.
    #[serde(default)]
    pub session_idle_timeout_secs: Option<u64>,
}

fn default_keepalive_secs() -> u64 {
    15
}

fn default_capture_timeout_ms() -> u64 {
    1500
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            sse_keepalive_secs: default_keepalive_secs(),
            capture_timeout_ms: default_capture_timeout_ms(),
            session_idle_timeout_secs: None,
        }
    }
}

impl McpConfig {
    pub fn sse_keepalive(&self) -> Duration {
        Duration::from_secs(self.sse_keepalive_secs.max(1))
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Display geometry reported by the headless device backend
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_width_px")]
    pub width_px: i64,
    #[serde(default = "default_height_px")]
    pub height_px: i64,
    #[serde(default = "default_density_dpi")]
    pub density_dpi: i64,
    #[serde(default)]
    pub rotation: i64,
}

fn default_width_px() -> i64 {
    1080
}

fn default_height_px() -> i64 {
    2400
}

fn default_density_dpi() -> i64 {
    420
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            width_px: default_width_px(),
            height_px: default_height_px(),
            density_dpi: default_density_dpi(),
            rotation: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,ctrl=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!("Cannot create config directory {}: {}", parent.display(), e);
                }
            }
            if let Err(e) = config.save(&config_path) {
                tracing::warn!(
                    "Default config not written to {}: {}",
                    config_path.display(),
                    e
                );
            }
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        let rl = &self.security.rate_limit;
        let finite = rl.capacity.is_finite() && rl.refill_per_sec.is_finite();
        if !finite || !(rl.capacity >= 1.0) || !(rl.refill_per_sec >= 0.0) {
            return Err(anyhow!(
                "rate_limit: capacity must be finite and >= 1, refill_per_sec finite and >= 0 (got {} / {})",
                rl.capacity,
                rl.refill_per_sec
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(anyhow!("server.max_body_bytes must be > 0"));
        }
        if self.device.width_px <= 0 || self.device.height_px <= 0 {
            return Err(anyhow!(
                "device: width_px and height_px must be positive (got {}x{})",
                self.device.width_px,
                self.device.height_px
            ));
        }
        Ok(())
    }
}
