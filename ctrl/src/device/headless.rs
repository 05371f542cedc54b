//! Capability backend for hosts without device integrations.
//!
//! Reports a fixed display geometry and answers every other capability with
//! [`DeviceError::Unavailable`], so tool calls return domain errors instead of
//! failing the RPC.

use async_trait::async_trait;
use std::time::Duration;

use super::{
    AppInfo, AppManager, DeviceError, DeviceResult, DisplayInfo, DisplayProbe, InputInjector,
    ScreenCapture, SystemKey, UiElement, UiInspector,
};

#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    display: DisplayInfo,
}

impl HeadlessDevice {
    pub fn new(display: DisplayInfo) -> Self {
        Self { display }
    }

    fn unavailable<T>(what: &str) -> DeviceResult<T> {
        Err(DeviceError::Unavailable(format!(
            "{} is not available on this host",
            what
        )))
    }
}

#[async_trait]
impl DisplayProbe for HeadlessDevice {
    async fn display_info(&self) -> DeviceResult<DisplayInfo> {
        Ok(self.display)
    }
}

#[async_trait]
impl ScreenCapture for HeadlessDevice {
    async fn capture_png(&self, _timeout: Duration) -> DeviceResult<Vec<u8>> {
        Self::unavailable("Screen capture")
    }
}

#[async_trait]
impl UiInspector for HeadlessDevice {
    async fn root(&self) -> DeviceResult<UiElement> {
        Self::unavailable("UI inspection")
    }

    async fn click(&self, _element: &UiElement) -> DeviceResult<()> {
        Self::unavailable("UI inspection")
    }
}

#[async_trait]
impl InputInjector for HeadlessDevice {
    async fn tap(&self, _x: i64, _y: i64) -> DeviceResult<()> {
        Self::unavailable("Input control")
    }

    async fn long_press(&self, _x: i64, _y: i64, _duration: Duration) -> DeviceResult<()> {
        Self::unavailable("Input control")
    }

    async fn swipe(
        &self,
        _from: (i64, i64),
        _to: (i64, i64),
        _duration: Duration,
    ) -> DeviceResult<()> {
        Self::unavailable("Input control")
    }

    async fn press_key(&self, _key: SystemKey) -> DeviceResult<()> {
        Self::unavailable("Input control")
    }

    async fn set_text(&self, _text: &str) -> DeviceResult<()> {
        Self::unavailable("Input control")
    }
}

#[async_trait]
impl AppManager for HeadlessDevice {
    async fn is_installed(&self, _package_name: &str) -> DeviceResult<bool> {
        Self::unavailable("Package management")
    }

    async fn launch(&self, _package_name: &str) -> DeviceResult<()> {
        Self::unavailable("Package management")
    }

    async fn launchable_packages(&self) -> DeviceResult<Vec<String>> {
        Self::unavailable("Package management")
    }

    async fn installed_apps(&self) -> DeviceResult<Vec<AppInfo>> {
        Self::unavailable("Package management")
    }
}
