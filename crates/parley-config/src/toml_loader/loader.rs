use std::io::ErrorKind;
use std::path::Path;

use parley_common::ConfigError;
use tracing::{debug, info, warn};

use super::paths::{create_default_config, default_config_path};
use crate::schema::ParleyConfig;
use crate::validation;

/// Parse a TOML document. Absent keys take their serde defaults.
pub fn parse_str(content: &str) -> Result<ParleyConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("invalid TOML: {e}")))
}

/// Read and parse `path`.
///
/// Out-of-range values only produce a warning here so a slightly wrong
/// file still starts the client; run [`validation::validate`] to reject it.
pub fn load_from_path(path: &Path) -> Result<ParleyConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    let config = parse_str(&content)?;
    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), "config has out-of-range values: {e}");
    }
    debug!(path = %path.display(), "config parsed");
    Ok(config)
}

/// Load `<config_dir>/parley/config.toml`, writing the commented template
/// there first when it does not exist.
pub fn load_default() -> Result<ParleyConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            create_default_config(&path)?;
            info!(path = %path.display(), "wrote default voice config");
            Ok(ParleyConfig::default())
        }
        other => other,
    }
}
