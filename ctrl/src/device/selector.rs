//! Attribute selectors over UI snapshots

use super::types::UiElement;

/// Every present field must match; absent fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiSelector {
    /// Case-insensitive substring
    pub text: Option<String>,
    /// Case-insensitive substring
    pub content_description: Option<String>,
    pub view_id: Option<String>,
    pub class_name: Option<String>,
    pub package_name: Option<String>,
    pub clickable: Option<bool>,
    pub editable: Option<bool>,
    pub enabled: Option<bool>,
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn equals(value: Option<&str>, wanted: &str) -> bool {
    value == Some(wanted)
}

impl UiSelector {
    pub fn matches(&self, el: &UiElement) -> bool {
        if let Some(text) = &self.text {
            if !contains_ignore_case(el.text.as_deref(), text) {
                return false;
            }
        }
        if let Some(desc) = &self.content_description {
            if !contains_ignore_case(el.content_description.as_deref(), desc) {
                return false;
            }
        }
        if let Some(id) = &self.view_id {
            if !equals(el.view_id.as_deref(), id) {
                return false;
            }
        }
        if let Some(class) = &self.class_name {
            if !equals(el.class_name.as_deref(), class) {
                return false;
            }
        }
        if let Some(pkg) = &self.package_name {
            if !equals(el.package_name.as_deref(), pkg) {
                return false;
            }
        }
        self.clickable.map_or(true, |c| el.clickable == c)
            && self.editable.map_or(true, |e| el.editable == e)
            && self.enabled.map_or(true, |e| el.enabled == e)
    }

    /// Pre-order search returning at most `limit` matches
    pub fn find<'a>(&self, root: &'a UiElement, limit: usize) -> Vec<&'a UiElement> {
        let mut out = Vec::new();
        self.visit(root, limit, &mut out);
        out
    }

    fn visit<'a>(&self, node: &'a UiElement, limit: usize, out: &mut Vec<&'a UiElement>) {
        if out.len() >= limit {
            return;
        }
        if self.matches(node) {
            out.push(node);
        }
        for child in &node.children {
            self.visit(child, limit, out);
            if out.len() >= limit {
                return;
            }
        }
    }
}
