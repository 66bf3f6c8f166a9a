use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const VERBOSE_LOGGING: &str = "GES_VERBOSE_LOGGING";
const VERIFY_PARAMETER_TYPES: &str = "GES_VERIFY_PARAMETER_TYPES";
const LOG_STALE_REMOVALS: &str = "GES_LOG_STALE_REMOVALS";

/// Errors raised while loading options
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse environment variable {name}: '{value}' is not a boolean")]
    InvalidBool { name: &'static str, value: String },

    #[error("failed to read options file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse options file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Options read by the event bus on every bind and emit.
///
/// Each bus owns its own copy; replacing them with `EventBus::set_options` takes effect on
/// the next operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOptions {
    /// Log routine bind/emit/dispatch traffic at info instead of debug
    pub verbose_logging: bool,
    /// Check each receiving function's declared parameter against the payload before
    /// invoking it; mismatches are skipped and logged
    pub verify_parameter_types: bool,
    /// Log every registration dropped because its receiver was destroyed
    pub log_stale_removals: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            verbose_logging: false,
            verify_parameter_types: true,
            log_stale_removals: false,
        }
    }
}

impl GlobalOptions {
    /// Loads options from the environment, falling back to the defaults if any variable
    /// is malformed.
    pub fn from_env() -> GlobalOptions {
        match Self::try_from_env() {
            Ok(options) => options,
            Err(err) => {
                warn!("{}, using default options", err);
                GlobalOptions::default()
            }
        }
    }

    /// Loads options from the environment (and a `.env` file, if present). Unset variables
    /// keep their default value.
    pub fn try_from_env() -> Result<GlobalOptions, ConfigError> {
        dotenv().ok();

        let defaults = GlobalOptions::default();
        let options = GlobalOptions {
            verbose_logging: read_bool(VERBOSE_LOGGING, defaults.verbose_logging)?,
            verify_parameter_types: read_bool(VERIFY_PARAMETER_TYPES, defaults.verify_parameter_types)?,
            log_stale_removals: read_bool(LOG_STALE_REMOVALS, defaults.log_stale_removals)?,
        };
        info!("Loaded event system options from env: {:?}", options);
        Ok(options)
    }

    /// Reads options from a JSON file. Missing fields keep their default value.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<GlobalOptions, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn read_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool { name, value }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
