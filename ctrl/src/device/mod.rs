//! Device capability contracts
//!
//! The gateway never talks to hardware itself. Each capability is a trait the
//! host process implements (screen capture, accessibility inspection, gesture
//! injection, package management); tools only see these contracts.

pub mod headless;
pub mod selector;
mod types;

pub use headless::HeadlessDevice;
pub use selector::UiSelector;
pub use types::{AppInfo, Bounds, DisplayInfo, SystemKey, UiElement};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Failure reported by a capability backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The backing service is not enabled or not bound
    #[error("{0}")]
    Unavailable(String),

    #[error("Package not installed: {0}")]
    NotInstalled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

#[async_trait]
pub trait DisplayProbe: Send + Sync {
    async fn display_info(&self) -> DeviceResult<DisplayInfo>;
}

#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture the screen as PNG bytes, giving up after `timeout`
    async fn capture_png(&self, timeout: Duration) -> DeviceResult<Vec<u8>>;
}

#[async_trait]
pub trait UiInspector: Send + Sync {
    /// Snapshot of the active window's element tree
    async fn root(&self) -> DeviceResult<UiElement>;

    /// Perform a click action on an element from a previous snapshot
    async fn click(&self, element: &UiElement) -> DeviceResult<()>;
}

#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn tap(&self, x: i64, y: i64) -> DeviceResult<()>;

    async fn long_press(&self, x: i64, y: i64, duration: Duration) -> DeviceResult<()>;

    async fn swipe(
        &self,
        from: (i64, i64),
        to: (i64, i64),
        duration: Duration,
    ) -> DeviceResult<()>;

    async fn press_key(&self, key: SystemKey) -> DeviceResult<()>;

    /// Set text in the focused editable field, or the first editable one
    async fn set_text(&self, text: &str) -> DeviceResult<()>;
}

#[async_trait]
pub trait AppManager: Send + Sync {
    async fn is_installed(&self, package_name: &str) -> DeviceResult<bool>;

    async fn launch(&self, package_name: &str) -> DeviceResult<()>;

    async fn launchable_packages(&self) -> DeviceResult<Vec<String>>;

    /// Every installed application, unfiltered
    async fn installed_apps(&self) -> DeviceResult<Vec<AppInfo>>;
}

/// Handles to every capability backend, shared by all tool invocations
#[derive(Clone)]
pub struct Capabilities {
    pub display: Arc<dyn DisplayProbe>,
    pub screen: Arc<dyn ScreenCapture>,
    pub ui: Arc<dyn UiInspector>,
    pub input: Arc<dyn InputInjector>,
    pub apps: Arc<dyn AppManager>,
}

impl Capabilities {
    /// Use one backend object for every capability
    pub fn from_backend<D>(device: Arc<D>) -> Self
    where
        D: DisplayProbe + ScreenCapture + UiInspector + InputInjector + AppManager + 'static,
    {
        Self {
            display: device.clone(),
            screen: device.clone(),
            ui: device.clone(),
            input: device.clone(),
            apps: device,
        }
    }
}
