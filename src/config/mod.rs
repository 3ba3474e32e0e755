pub mod types;

use crate::error::{ConfigError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use types::Config;

const CONFIG_FILE_NAME: &str = ".chartscan.toml";

/// Get the global config file path (~/.chartscan.toml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_FILE_NAME))
}

/// Get the local config file path (project/.chartscan.toml)
pub fn local_config_path(project_path: &Path) -> PathBuf {
    project_path.join(CONFIG_FILE_NAME)
}

/// Load configuration from an explicit file, the local file, the global
/// file, or defaults - in that order.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit_path {
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParsingFailed(e.to_string()))?;
        return Ok(config);
    }

    let local = local_config_path(Path::new("."));
    if local.exists()
        && let Ok(content) = fs::read_to_string(&local)
        && let Ok(config) = toml::from_str(&content)
    {
        return Ok(config);
    }

    if let Some(global) = global_config_path()
        && global.exists()
        && let Ok(content) = fs::read_to_string(&global)
        && let Ok(config) = toml::from_str(&content)
    {
        return Ok(config);
    }

    Ok(Config::default())
}

/// Save configuration to the global config file
pub fn save_global_config(config: &Config) -> Result<()> {
    if let Some(path) = global_config_path() {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::ParsingFailed(e.to_string()))?;
        fs::write(&path, content)?;
    }
    Ok(())
}
