//! Theme payloads and applied-theme state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A CSS/JS bundle deployed to an embedded page.
///
/// Either part may be empty. A payload with both empty is still valid and
/// applies as a visual no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemePayload {
    /// Human-readable label.
    pub name: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
}

impl ThemePayload {
    /// Create a new payload.
    pub fn new(name: impl Into<String>, css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            css: css.into(),
            js: js.into(),
        }
    }

    /// Create a stylesheet-only payload.
    pub fn css_only(name: impl Into<String>, css: impl Into<String>) -> Self {
        Self::new(name, css, "")
    }

    /// True when applying this payload changes nothing visible.
    pub fn is_empty(&self) -> bool {
        self.css.is_empty() && self.js.is_empty()
    }
}

/// The theme currently active in an embedded page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTheme {
    pub css: String,
    pub js: String,
    pub applied_at: DateTime<Utc>,
    /// Protocol version the theme was applied under.
    pub version: String,
}

impl AppliedTheme {
    /// Record `payload` as applied at `applied_at`.
    pub fn from_payload(payload: &ThemePayload, applied_at: DateTime<Utc>, version: &str) -> Self {
        Self {
            css: payload.css.clone(),
            js: payload.js.clone(),
            applied_at,
            version: version.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parts_decode_as_empty() {
        let payload: ThemePayload = serde_json::from_str(r#"{"name":"Bare"}"#).unwrap();
        assert_eq!(payload.name, "Bare");
        assert!(payload.is_empty());
    }

    #[test]
    fn applied_theme_uses_camel_case() {
        let payload = ThemePayload::css_only("Dark", "body{background:#000}");
        let applied = AppliedTheme::from_payload(&payload, Utc::now(), "1.0.0");
        let value = serde_json::to_value(&applied).unwrap();
        assert!(value.get("appliedAt").is_some());
        assert_eq!(value["css"], "body{background:#000}");
        assert_eq!(value["js"], "");
    }
}
