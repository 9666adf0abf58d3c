use primeq_client::{load_settings, MqSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub mq: MqSettings,
    pub http: HttpSettings,
    pub queues: QueueSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Where stored records are sent
    pub inbound_queue: String,
    /// Where the worker posts verdicts
    pub outbound_queue: String,
    /// How long `/results` waits for each further message
    pub results_wait_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            inbound_queue: "DEV.QUEUE.1".to_string(),
            outbound_queue: "DEV.QUEUE.2".to_string(),
            results_wait_ms: 500,
        }
    }
}

impl QueueSettings {
    pub fn results_wait(&self) -> Duration {
        Duration::from_millis(self.results_wait_ms)
    }
}

impl FrontendConfig {
    /// Optional YAML file, then `PRIMEQ_*` environment variables
    /// (e.g. `PRIMEQ_HTTP__PORT`)
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        Ok(load_settings(path)?)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}
