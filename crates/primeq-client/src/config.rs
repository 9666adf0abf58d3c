use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `PRIMEQ_MQ__QUEUE_MANAGER`
pub const ENV_PREFIX: &str = "PRIMEQ";

/// Broker session settings shared by every process that talks to the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqSettings {
    pub queue_manager: String,
    pub channel: String,
    /// `host(port)`, optionally a comma-separated list
    pub connection: String,
    pub user: String,
    pub password: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for MqSettings {
    fn default() -> Self {
        MqSettings {
            queue_manager: "QM1".to_string(),
            channel: "DEV.APP.SVRCONN".to_string(),
            connection: "localhost(1414)".to_string(),
            user: "app".to_string(),
            password: None,
            connect_timeout_ms: 5000,
            request_timeout_ms: 10_000,
        }
    }
}

/// Load settings from an optional YAML file, then `PRIMEQ_*` environment
/// variables. Nested keys are separated by `__` in variable names.
pub fn load_settings<T: DeserializeOwned>(path: Option<&str>) -> Result<T, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(File::with_name(path).required(false));
    }

    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
