//! Shared fixtures for gateway integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ctrl::device::{
    AppInfo, AppManager, Bounds, Capabilities, DeviceError, DeviceResult, DisplayInfo,
    DisplayProbe, InputInjector, ScreenCapture, SystemKey, UiElement, UiInspector,
};
use ctrl::Config;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// 1x1 transparent PNG
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Fake device that records every action it is asked to perform
pub struct RecordingDevice {
    pub display: DisplayInfo,
    pub actions: Mutex<Vec<String>>,
    pub root: Option<UiElement>,
    pub apps: Vec<AppInfo>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            display: DisplayInfo {
                width_px: 1080,
                height_px: 2400,
                density_dpi: 420,
                rotation: 0,
            },
            actions: Mutex::new(Vec::new()),
            root: Some(sample_tree()),
            apps: vec![
                AppInfo {
                    package_name: "com.example.mail".to_string(),
                    label: "Mail".to_string(),
                    is_system: false,
                },
                AppInfo {
                    package_name: "com.android.settings".to_string(),
                    label: "Settings".to_string(),
                    is_system: true,
                },
            ],
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }

    fn record(&self, action: String) {
        self.actions.lock().push(action);
    }
}

pub fn sample_tree() -> UiElement {
    UiElement {
        class_name: Some("android.widget.FrameLayout".to_string()),
        package_name: Some("com.example.mail".to_string()),
        bounds: Bounds {
            left: 0,
            top: 0,
            right: 1080,
            bottom: 2400,
        },
        enabled: true,
        children: vec![
            UiElement {
                text: Some("Compose".to_string()),
                view_id: Some("com.example.mail:id/compose".to_string()),
                class_name: Some("android.widget.Button".to_string()),
                package_name: Some("com.example.mail".to_string()),
                bounds: Bounds {
                    left: 100,
                    top: 200,
                    right: 300,
                    bottom: 260,
                },
                clickable: true,
                enabled: true,
                ..Default::default()
            },
            UiElement {
                class_name: Some("android.widget.EditText".to_string()),
                package_name: Some("com.example.mail".to_string()),
                editable: true,
                focused: true,
                enabled: true,
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

#[async_trait]
impl DisplayProbe for RecordingDevice {
    async fn display_info(&self) -> DeviceResult<DisplayInfo> {
        Ok(self.display)
    }
}

#[async_trait]
impl ScreenCapture for RecordingDevice {
    async fn capture_png(&self, _timeout: Duration) -> DeviceResult<Vec<u8>> {
        self.record("capture".to_string());
        Ok(TINY_PNG.to_vec())
    }
}

#[async_trait]
impl UiInspector for RecordingDevice {
    async fn root(&self) -> DeviceResult<UiElement> {
        self.root
            .clone()
            .ok_or_else(|| DeviceError::Unavailable("Accessibility service not enabled".into()))
    }

    async fn click(&self, element: &UiElement) -> DeviceResult<()> {
        self.record(format!(
            "click {}",
            element.view_id.as_deref().unwrap_or("<no id>")
        ));
        Ok(())
    }
}

#[async_trait]
impl InputInjector for RecordingDevice {
    async fn tap(&self, x: i64, y: i64) -> DeviceResult<()> {
        self.record(format!("tap {} {}", x, y));
        Ok(())
    }

    async fn long_press(&self, x: i64, y: i64, duration: Duration) -> DeviceResult<()> {
        self.record(format!("long_press {} {} {}", x, y, duration.as_millis()));
        Ok(())
    }

    async fn swipe(&self, from: (i64, i64), to: (i64, i64), duration: Duration) -> DeviceResult<()> {
        self.record(format!(
            "swipe {} {} {} {} {}",
            from.0,
            from.1,
            to.0,
            to.1,
            duration.as_millis()
        ));
        Ok(())
    }

    async fn press_key(&self, key: SystemKey) -> DeviceResult<()> {
        self.record(format!("key {}", key.as_str()));
        Ok(())
    }

    async fn set_text(&self, text: &str) -> DeviceResult<()> {
        self.record(format!("text {}", text));
        Ok(())
    }
}

#[async_trait]
impl AppManager for RecordingDevice {
    async fn is_installed(&self, package_name: &str) -> DeviceResult<bool> {
        Ok(self.apps.iter().any(|a| a.package_name == package_name))
    }

    async fn launch(&self, package_name: &str) -> DeviceResult<()> {
        if self.apps.iter().any(|a| a.package_name == package_name) {
            self.record(format!("launch {}", package_name));
            Ok(())
        } else {
            Err(DeviceError::NotInstalled(package_name.to_string()))
        }
    }

    async fn launchable_packages(&self) -> DeviceResult<Vec<String>> {
        Ok(self.apps.iter().map(|a| a.package_name.clone()).collect())
    }

    async fn installed_apps(&self) -> DeviceResult<Vec<AppInfo>> {
        Ok(self.apps.clone())
    }
}

/// A device plus the capability handles the gateway uses
pub fn recording_caps() -> (Arc<RecordingDevice>, Capabilities) {
    let device = Arc::new(RecordingDevice::new());
    let caps = Capabilities::from_backend(device.clone());
    (device, caps)
}

/// Default config with a short keep-alive for stream tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.mcp.sse_keepalive_secs = 1;
    config.server.shutdown_grace_secs = 1;
    config
}
