//! Layered configuration loading
//!
//! Later layers override earlier ones: built-in defaults, then one TOML file,
//! then `PERMWEAVE__SECTION__KEY` environment variables.

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use std::fs;
use std::path::Path;

/// Searched in order when no file is named; the first hit is used
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "permweave.toml",
    ".permweave.toml",
    "~/.config/permweave/config.toml",
    "/etc/permweave/config.toml",
];

/// Parse a TOML document without consulting files or the environment
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    finish(Config::builder().add_source(File::from_str(toml_str, FileFormat::Toml)))
}

/// Load from `config_path` (or the first default path found) plus the environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let file = match config_path {
        Some(path) if !Path::new(path).exists() => {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {path}"
            )));
        }
        Some(path) => Some(path.to_string()),
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists()),
    };

    let mut builder = Config::builder();
    if let Some(path) = file {
        let contents = fs::read_to_string(&path)?;
        builder = builder.add_source(File::from_str(&contents, FileFormat::Toml));
    }

    finish(
        builder.add_source(
            Environment::with_prefix("PERMWEAVE")
                .separator("__")
                .try_parsing(true),
        ),
    )
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig, ConfigError> {
    let app_config: AppConfig = builder
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;
    Ok(app_config)
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.store.path.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: "store.path".to_string(),
        });
    }

    if config.cache.max_entries == 0 {
        return Err(ConfigError::Invalid {
            message: "cache.max_entries must be greater than 0".to_string(),
        });
    }

    Ok(())
}
