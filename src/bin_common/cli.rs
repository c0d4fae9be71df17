//! CLI utilities for binaries
//!
//! Handles configuration loading, environment variables and logging
//! for all binary executables.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Connection settings (connection.yaml)
    Connection,
    /// Fixed-width message dictionary (dictionary.yaml)
    Dictionary,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Connection => "config/connection.yaml",
            ConfigType::Dictionary => "config/dictionary.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Connection => "CONNECTION_CONFIG_PATH",
            ConfigType::Dictionary => "DICTIONARY_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use wirebench::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Dictionary);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Initialize tracing, letting `RUST_LOG` override the configured level
pub fn init_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_type_paths() {
        assert_eq!(ConfigType::Connection.default_path(), "config/connection.yaml");
        assert_eq!(ConfigType::Dictionary.default_path(), "config/dictionary.yaml");

        let custom = ConfigType::Custom("custom/path.yaml".to_string());
        assert_eq!(custom.default_path(), "custom/path.yaml");
    }

    #[test]
    fn test_config_type_env_vars() {
        assert_eq!(ConfigType::Connection.env_var_name(), "CONNECTION_CONFIG_PATH");
        assert_eq!(ConfigType::Dictionary.env_var_name(), "DICTIONARY_PATH");
        assert_eq!(ConfigType::Custom("x".into()).env_var_name(), "CONFIG_PATH");
    }
}
