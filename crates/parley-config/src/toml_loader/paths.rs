use std::path::{Path, PathBuf};

use parley_common::ConfigError;

use super::template::default_config_toml;

/// `<config_dir>/parley/config.toml` for the current platform.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("parley").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("no config directory on this platform".into()))
}

/// Write the commented template to `path`, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let io_err = |what: &str, p: &Path, e: std::io::Error| {
        ConfigError::ParseError(format!("cannot {what} {}: {e}", p.display()))
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err("create", parent, e))?;
    }
    std::fs::write(path, default_config_toml()).map_err(|e| io_err("write", path, e))
}
