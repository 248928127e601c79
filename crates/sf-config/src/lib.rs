//! StreamForward Configuration
//!
//! Loads the forwarder configuration once at process start, either from a TOML
//! file (when `SF_CONFIG_PATH` is set) or from the deployment's environment
//! variables.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SF_CONFIG_PATH` | - | TOML config file; when set, the variables below are ignored |
//! | `EVB_NAME` | - | Destination event bus (required) |
//! | `Environment` | - | Environment tag appended to table prefixes (required) |
//! | `EVB_SOURCE_NAME_EMPLOYEE` | - | Event source for employee data (required) |
//! | `EVB_DETAIL_TYPE_EMPLOYEE` | - | Detail type for employee data (required) |
//! | `EVB_SOURCE_NAME_APPRECIATION` | - | Event source for appreciation data (required) |
//! | `EVB_DETAIL_TYPE_APPRECIATION` | - | Detail type for appreciation data (required) |
//! | `SF_CHUNK_LIMIT` | `10` | Entries per publish call (1-10) |
//! | `SF_PUBLISH_TIMEOUT_MS` | - | Per-call publish timeout |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sf_common::{ClientProfile, ProfileSet, ProfileSetError, MAX_PUBLISH_BATCH};
use thiserror::Error;
use tracing::info;

pub const CONFIG_PATH_VAR: &str = "SF_CONFIG_PATH";
pub const BUS_NAME_VAR: &str = "EVB_NAME";
pub const ENVIRONMENT_VAR: &str = "Environment";
pub const CHUNK_LIMIT_VAR: &str = "SF_CHUNK_LIMIT";
pub const PUBLISH_TIMEOUT_VAR: &str = "SF_PUBLISH_TIMEOUT_MS";

/// Producers wired up when configuring from environment variables:
/// (profile name, table prefix, source-name variable, detail-type variable)
const BUILTIN_PRODUCERS: [(&str, &str, &str, &str); 2] = [
    (
        "employee",
        "EmployeeDataTable-",
        "EVB_SOURCE_NAME_EMPLOYEE",
        "EVB_DETAIL_TYPE_EMPLOYEE",
    ),
    (
        "appreciation",
        "TenantAppreciationsTable-",
        "EVB_SOURCE_NAME_APPRECIATION",
        "EVB_DETAIL_TYPE_APPRECIATION",
    ),
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error(transparent)]
    Profiles(#[from] ProfileSetError),
}

fn default_chunk_limit() -> usize {
    MAX_PUBLISH_BATCH
}

/// One logical producer as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub table_prefix: String,
    pub source_name: String,
    pub detail_type: String,
    /// Overrides the top-level bus for this producer
    #[serde(default)]
    pub event_bus_name: Option<String>,
    /// Overrides the top-level environment tag for this producer
    #[serde(default)]
    pub environment: Option<String>,
}

/// Top-level forwarder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    pub environment: String,
    pub event_bus_name: String,
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
    #[serde(default)]
    pub publish_timeout_ms: Option<u64>,
    pub profiles: Vec<ProfileConfig>,
}

impl ForwarderConfig {
    /// Load from `SF_CONFIG_PATH` if set, otherwise from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => {
                info!("Loading forwarder config from {}", path);
                Self::from_file(path)
            }
            _ => {
                info!("Loading forwarder config from environment");
                Self::from_env()
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ForwarderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        let chunk_limit = match get(CHUNK_LIMIT_VAR) {
            Some(raw) => parse_var(CHUNK_LIMIT_VAR, &raw)?,
            None => default_chunk_limit(),
        };
        let publish_timeout_ms = get(PUBLISH_TIMEOUT_VAR)
            .map(|raw| parse_var(PUBLISH_TIMEOUT_VAR, &raw))
            .transpose()?;

        let mut profiles = Vec::with_capacity(BUILTIN_PRODUCERS.len());
        for (name, table_prefix, source_var, detail_type_var) in BUILTIN_PRODUCERS {
            profiles.push(ProfileConfig {
                name: name.to_string(),
                table_prefix: table_prefix.to_string(),
                source_name: required(source_var)?,
                detail_type: required(detail_type_var)?,
                event_bus_name: None,
                environment: None,
            });
        }

        let config = ForwarderConfig {
            environment: required(ENVIRONMENT_VAR)?,
            event_bus_name: required(BUS_NAME_VAR)?,
            chunk_limit,
            publish_timeout_ms,
            profiles,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.trim().is_empty() {
            return Err(ConfigError::Invalid("environment must not be empty".to_string()));
        }
        if self.event_bus_name.trim().is_empty() {
            return Err(ConfigError::Invalid("event_bus_name must not be empty".to_string()));
        }
        if self.chunk_limit == 0 || self.chunk_limit > MAX_PUBLISH_BATCH {
            return Err(ConfigError::InvalidValue {
                key: "chunk_limit".to_string(),
                value: format!("{} (must be between 1 and {})", self.chunk_limit, MAX_PUBLISH_BATCH),
            });
        }
        if self.publish_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "publish_timeout_ms".to_string(),
                value: "0".to_string(),
            });
        }
        if self.profiles.is_empty() {
            return Err(ConfigError::Invalid("at least one profile is required".to_string()));
        }
        for profile in &self.profiles {
            let fields = [
                ("name", &profile.name),
                ("table_prefix", &profile.table_prefix),
                ("source_name", &profile.source_name),
                ("detail_type", &profile.detail_type),
            ];
            if let Some((field, _)) = fields.iter().find(|(_, v)| v.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "profile '{}' has an empty {}",
                    profile.name, field
                )));
            }
        }
        self.profile_set()?;
        Ok(())
    }

    /// Resolve per-profile overrides into client profiles
    pub fn client_profiles(&self) -> Vec<ClientProfile> {
        self.profiles
            .iter()
            .map(|p| ClientProfile {
                name: p.name.clone(),
                destination_bus_name: p
                    .event_bus_name
                    .clone()
                    .unwrap_or_else(|| self.event_bus_name.clone()),
                source_name: p.source_name.clone(),
                detail_type: p.detail_type.clone(),
                environment_tag: p
                    .environment
                    .clone()
                    .unwrap_or_else(|| self.environment.clone()),
                table_prefix: p.table_prefix.clone(),
            })
            .collect()
    }

    pub fn profile_set(&self) -> Result<ProfileSet, ConfigError> {
        Ok(ProfileSet::new(self.client_profiles())?)
    }

    pub fn publish_timeout(&self) -> Option<Duration> {
        self.publish_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
