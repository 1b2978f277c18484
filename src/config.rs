//! `butter.json`: editor, preview and readiness settings.

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::RetryPolicy;
use crate::editor::EditorConfig;
use crate::paths::{self, PathConfig};
use crate::previewer::PreviewConfig;

pub const CONFIG_FILE: &str = "butter.json";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ButterConfig {
    pub editor: EditorConfig,
    pub preview: PreviewConfig,
    pub readiness: RetryPolicy,
}

impl ButterConfig {
    /// Read `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&json).with_context(|| format!("Failed to parse config: {}", path.display()))?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Explicit file, else `butter.json` in the resolved config directory.
    pub fn locate(explicit: Option<&Path>, paths: &PathConfig) -> Result<Self> {
        match explicit {
            Some(p) => Self::load(p),
            None => Self::load(&paths::config_file(CONFIG_FILE, paths)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sections() {
        let cfg: ButterConfig = serde_json::from_str(
            r#"{"editor": {"editorWidth": 640}, "readiness": {"maxAttempts": 20}}"#,
        )
        .unwrap();
        assert_eq!(cfg.editor.editor_width, 640);
        assert_eq!(cfg.editor.editor_height, 400);
        assert_eq!(cfg.readiness.max_attempts, 20);
        assert_eq!(cfg.readiness.interval_ms, 10);
        assert_eq!(cfg.preview, PreviewConfig::default());
    }

    #[test]
    fn test_missing_file_defaults() {
        let cfg = ButterConfig::load(Path::new("/nonexistent/butter.json")).unwrap();
        assert_eq!(cfg, ButterConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("butter-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        let mut cfg = ButterConfig::default();
        cfg.preview.layout = Some("layout.html".into());
        cfg.save(&path).unwrap();

        let paths = PathConfig { config_dir: Some(dir.clone()) };
        assert_eq!(ButterConfig::locate(None, &paths).unwrap(), cfg);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = std::env::temp_dir().join(format!("butter-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(ButterConfig::load(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
