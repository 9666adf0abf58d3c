use primeq_client::{load_settings, MqSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub mq: MqSettings,
    pub consumer: ConsumerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub inbound_queue: String,
    pub outbound_queue: String,
    pub receive_wait_ms: u64,
    pub retry_delay_ms: u64,
    pub rounds: u32,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        ConsumerSettings {
            inbound_queue: "DEV.QUEUE.1".to_string(),
            outbound_queue: "DEV.QUEUE.2".to_string(),
            receive_wait_ms: 3000,
            retry_delay_ms: 5000,
            rounds: primeq_core::DEFAULT_ROUNDS,
        }
    }
}

impl ConsumerSettings {
    pub fn receive_wait(&self) -> Duration {
        Duration::from_millis(self.receive_wait_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl WorkerConfig {
    /// Optional YAML file, then `PRIMEQ_*` environment variables
    /// (e.g. `PRIMEQ_CONSUMER__INBOUND_QUEUE`)
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let config: WorkerConfig = load_settings(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.consumer.rounds == 0 {
            anyhow::bail!("consumer.rounds must be at least 1");
        }
        if self.consumer.inbound_queue.is_empty() || self.consumer.outbound_queue.is_empty() {
            anyhow::bail!("queue names must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.consumer.inbound_queue, "DEV.QUEUE.1");
        assert_eq!(config.consumer.outbound_queue, "DEV.QUEUE.2");
        assert_eq!(config.consumer.receive_wait(), Duration::from_secs(3));
        assert_eq!(config.consumer.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.consumer.rounds, 5);
        assert_eq!(config.mq.queue_manager, "QM1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let mut config = WorkerConfig::default();
        config.consumer.rounds = 0;
        assert!(config.validate().is_err());
    }
}
