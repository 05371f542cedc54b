//! `tools/call` result envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        /// Base64-encoded image bytes
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn png(base64: String) -> Self {
        ContentBlock::Image {
            data: base64,
            mime_type: "image/png".to_string(),
        }
    }
}

/// Outcome of a tool invocation. Device-level failures are carried here with
/// `is_error = true`; they are not JSON-RPC errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            structured_content: None,
            is_error: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![ContentBlock::text(text)])
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            structured_content: None,
            is_error: true,
        }
    }

    pub fn with_structured(mut self, structured: Value) -> Self {
        self.structured_content = Some(structured);
        self
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Image { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let result = CallToolResult::success(vec![
            ContentBlock::png("iVBORw0KGgo=".to_string()),
            ContentBlock::text("Captured 1080x2400 rotation=0"),
        ])
        .with_structured(json!({"widthPx": 1080}));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({
                "content": [
                    {"type": "image", "data": "iVBORw0KGgo=", "mimeType": "image/png"},
                    {"type": "text", "text": "Captured 1080x2400 rotation=0"}
                ],
                "structuredContent": {"widthPx": 1080},
                "isError": false
            })
        );
    }

    #[test]
    fn test_error_omits_structured_content() {
        let json = serde_json::to_value(CallToolResult::error("nope")).unwrap();
        assert_eq!(json["isError"], true);
        assert!(json.get("structuredContent").is_none());
        assert_eq!(json["content"][0]["text"], "nope");
    }
}
