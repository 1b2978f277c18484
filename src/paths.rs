//! Where `butter.json` lives.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment override for the configuration directory.
pub const CONFIG_DIR_ENV: &str = "BUTTER_CONFIG_DIR";

/// Explicit configuration directory, if the user gave one.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// `--config-dir` first, then `BUTTER_CONFIG_DIR`.
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from));
        Self { config_dir }
    }

    /// Resolved directory:
    /// 1. explicit directory (CLI or ENV)
    /// 2. working directory, when it already holds `butter.json`
    /// 3. platform config directory (`~/.config/butter` on Linux,
    ///    `~/Library/Application Support/butter` on macOS, `%APPDATA%\butter` on Windows)
    /// 4. `.`
    pub fn resolve(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(cwd) = std::env::current_dir()
            && holds_config(&cwd)
        {
            return cwd;
        }
        dirs_next::config_dir()
            .map(|d| d.join("butter"))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn holds_config(dir: &Path) -> bool {
    dir.join(crate::config::CONFIG_FILE).is_file()
}

/// Path of configuration file `name`.
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config.resolve().join(name)
}

/// Create the configuration directory if needed.
pub fn ensure_dirs(config: &PathConfig) -> Result<PathBuf> {
    let dir = config.resolve();
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}
