use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub width_px: i64,
    pub height_px: i64,
    pub density_dpi: i64,
    pub rotation: i64,
}

impl DisplayInfo {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width_px && y < self.height_px
    }
}

impl From<crate::config::DeviceConfig> for DisplayInfo {
    fn from(cfg: crate::config::DeviceConfig) -> Self {
        Self {
            width_px: cfg.width_px,
            height_px: cfg.height_px,
            density_dpi: cfg.density_dpi,
            rotation: cfg.rotation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Bounds {
    pub fn center(&self) -> (i64, i64) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }
}

/// One node of an accessibility snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiElement {
    pub text: Option<String>,
    pub content_description: Option<String>,
    pub view_id: Option<String>,
    pub class_name: Option<String>,
    pub package_name: Option<String>,
    pub bounds: Bounds,
    pub clickable: bool,
    pub editable: bool,
    pub focused: bool,
    pub enabled: bool,
    #[serde(default)]
    pub children: Vec<UiElement>,
}

impl UiElement {
    /// Wire form used in tool results, with derived center coordinates
    pub fn to_json(&self) -> Value {
        let (center_x, center_y) = self.bounds.center();
        json!({
            "text": self.text,
            "contentDescription": self.content_description,
            "viewId": self.view_id,
            "className": self.class_name,
            "packageName": self.package_name,
            "clickable": self.clickable,
            "editable": self.editable,
            "focused": self.focused,
            "enabled": self.enabled,
            "bounds": {
                "left": self.bounds.left,
                "top": self.bounds.top,
                "right": self.bounds.right,
                "bottom": self.bounds.bottom,
                "centerX": center_x,
                "centerY": center_y,
            },
            "children": self.children.iter().map(UiElement::to_json).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub package_name: String,
    pub label: String,
    pub is_system: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKey {
    Back,
    Home,
    Recents,
}

impl SystemKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemKey::Back => "back",
            SystemKey::Home => "home",
            SystemKey::Recents => "recents",
        }
    }
}

impl FromStr for SystemKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "back" => Ok(SystemKey::Back),
            "home" => Ok(SystemKey::Home),
            "recents" => Ok(SystemKey::Recents),
            other => Err(format!("Unknown key: {}. Use back, home, or recents.", other)),
        }
    }
}
