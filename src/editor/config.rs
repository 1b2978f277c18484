//! Editor session settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ButterError, ButterResult};

/// Where editor documents are shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorTarget {
    /// Iframe mounted under this DOM node.
    Dom(String),
    /// Existing named window reused for every session.
    Window(String),
    /// Fresh popup per session.
    Popup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    pub editor_width: u32,
    pub editor_height: u32,
    pub target: Option<String>,        // DOM mount point (iframe mode)
    pub target_window: Option<String>, // named window (popup mode), exclusive with `target`
    pub default_editor: String,
    pub custom_editors: BTreeMap<String, String>, // plugin type -> editor document
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            editor_width: 400,
            editor_height: 400,
            target: None,
            target_window: None,
            default_editor: "defaultEditor.html".to_string(),
            custom_editors: BTreeMap::new(),
        }
    }
}

impl EditorConfig {
    pub fn validate(&self) -> ButterResult<()> {
        if self.target.is_some() && self.target_window.is_some() {
            return Err(ButterError::config("editor: `target` and `targetWindow` are mutually exclusive"));
        }
        if self.editor_width == 0 || self.editor_height == 0 {
            return Err(ButterError::config("editor: dimensions must be non-zero"));
        }
        if self.default_editor.is_empty() {
            return Err(ButterError::config("editor: `defaultEditor` is empty"));
        }
        Ok(())
    }

    pub fn editor_target(&self) -> EditorTarget {
        match (&self.target, &self.target_window) {
            (Some(dom), _) => EditorTarget::Dom(dom.clone()),
            (None, Some(win)) => EditorTarget::Window(win.clone()),
            (None, None) => EditorTarget::Popup,
        }
    }

    pub fn set_editor_target(&mut self, target: EditorTarget) {
        match target {
            EditorTarget::Dom(dom) => {
                self.target = Some(dom);
                self.target_window = None;
            }
            EditorTarget::Window(win) => {
                self.target = None;
                self.target_window = Some(win);
            }
            EditorTarget::Popup => {
                self.target = None;
                self.target_window = None;
            }
        }
    }

    /// Per-type override, then the runtime manifest's editor, then the default.
    pub fn editor_url(&self, plugin_type: &str, manifest_editor: Option<&str>) -> String {
        self.custom_editors
            .get(plugin_type)
            .map(String::as_str)
            .or(manifest_editor)
            .unwrap_or(self.default_editor.as_str())
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: EditorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EditorConfig::default());
        assert_eq!(cfg.editor_target(), EditorTarget::Popup);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_target_and_window_exclusive() {
        let cfg: EditorConfig =
            serde_json::from_str(r#"{"target": "editor-div", "targetWindow": "w"}"#).unwrap();
        assert!(matches!(cfg.validate(), Err(ButterError::Config(_))));
    }

    #[test]
    fn test_editor_url_resolution() {
        let mut cfg = EditorConfig::default();
        assert_eq!(cfg.editor_url("text", None), "defaultEditor.html");
        assert_eq!(cfg.editor_url("text", Some("textEditor.html")), "textEditor.html");
        cfg.custom_editors.insert("text".into(), "custom.html".into());
        assert_eq!(cfg.editor_url("text", Some("textEditor.html")), "custom.html");
    }

    #[test]
    fn test_switch_target() {
        let mut cfg = EditorConfig { target: Some("div".into()), ..Default::default() };
        assert_eq!(cfg.editor_target(), EditorTarget::Dom("div".into()));
        cfg.set_editor_target(EditorTarget::Window("w".into()));
        assert_eq!(cfg.target, None);
        assert_eq!(cfg.editor_target(), EditorTarget::Window("w".into()));
    }
}
