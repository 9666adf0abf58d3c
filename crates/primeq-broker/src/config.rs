use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub listener: ListenerConfig,
    pub queue_manager: String,
    pub channels: Vec<String>,
    pub users: Vec<UserConfig>,
    pub queues: Vec<QueueConfig>,
    pub limits: LimitsConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    /// When unset any password is accepted for this user
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Upper bound applied to a client's requested receive wait
    pub max_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub prometheus_port: Option<u16>,
    pub log_level: String,
}

fn default_max_depth() -> usize {
    5000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            listener: ListenerConfig {
                host: "0.0.0.0".to_string(),
                port: 1414,
            },
            queue_manager: "QM1".to_string(),
            channels: vec![
                "DEV.APP.SVRCONN".to_string(),
                "DEV.ADMIN.SVRCONN".to_string(),
            ],
            users: vec![UserConfig {
                name: "app".to_string(),
                password: None,
            }],
            queues: (1..=3)
                .map(|n| QueueConfig {
                    name: format!("DEV.QUEUE.{}", n),
                    max_depth: default_max_depth(),
                })
                .collect(),
            limits: LimitsConfig { max_wait_ms: 60_000 },
            monitoring: MonitoringConfig {
                prometheus_port: Some(9157),
                log_level: "info".to_string(),
            },
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Listen on an ephemeral loopback port without a metrics endpoint
    pub fn local() -> Self {
        let mut config = BrokerConfig::default();
        config.listener.host = "127.0.0.1".to_string();
        config.listener.port = 0;
        config.monitoring.prometheus_port = None;
        config
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.listener.host, self.listener.port)
    }
}
