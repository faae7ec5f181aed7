//! Runner configuration and errors.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wiolte_modem::{ModemConfig, ModemError};

/// Errors surfaced by the runner.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("cannot reach UART bridge at {address}: {source}")]
    Bridge {
        address: String,
        source: std::io::Error,
    },

    #[error("module did not come up")]
    BootFailed,

    #[error("network activation failed")]
    ActivationFailed,

    #[error(transparent)]
    Modem(#[from] ModemError),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// PDP context credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPoint {
    pub apn: String,
    pub user: String,
    pub password: String,
}

impl Default for AccessPoint {
    fn default() -> Self {
        AccessPoint {
            apn: "soracom.io".to_string(),
            user: "sora".to_string(),
            password: "sora".to_string(),
        }
    }
}

/// Top-level runner configuration, normally loaded from YAML.
///
/// ```yaml
/// bridge: 192.168.1.20:7000
/// access_point:
///   apn: soracom.io
///   user: sora
///   password: sora
/// modem:
///   name: field-unit
///   command_timeout_ms: 3000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Address of the TCP serial bridge in front of the module's UART.
    pub bridge: String,
    pub access_point: AccessPoint,
    pub modem: ModemConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            bridge: "127.0.0.1:7000".to_string(),
            access_point: AccessPoint::default(),
            modem: ModemConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_yaml(text: &str, path: &str) -> RunnerResult<Self> {
        serde_yaml::from_str(text).map_err(|source| RunnerError::ConfigParse {
            path: path.to_string(),
            source,
        })
    }

    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> RunnerResult<Self> {
        let Some(path) = path else {
            return Ok(RunnerConfig::default());
        };
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::ConfigRead {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml(&text, &display)
    }
}
