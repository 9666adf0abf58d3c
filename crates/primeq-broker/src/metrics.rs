use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

/// Prometheus metrics for the broker
pub struct BrokerMetrics {
    pub registry: Registry,

    pub messages_put: IntCounterVec,
    pub messages_got: IntCounterVec,
    pub queue_depth: IntGaugeVec,

    pub sessions_active: IntGauge,
    pub connects_rejected: IntCounterVec,
}

impl BrokerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let messages_put = IntCounterVec::new(
            Opts::new("pq_messages_put_total", "Messages accepted per queue"),
            &["queue"],
        )?;
        registry.register(Box::new(messages_put.clone()))?;

        let messages_got = IntCounterVec::new(
            Opts::new("pq_messages_got_total", "Messages delivered per queue"),
            &["queue"],
        )?;
        registry.register(Box::new(messages_got.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("pq_queue_depth", "Current depth per queue"),
            &["queue"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let sessions_active = IntGauge::new("pq_sessions_active", "Connected sessions")?;
        registry.register(Box::new(sessions_active.clone()))?;

        let connects_rejected = IntCounterVec::new(
            Opts::new("pq_connects_rejected_total", "Rejected connection attempts by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(connects_rejected.clone()))?;

        Ok(BrokerMetrics {
            registry,
            messages_put,
            messages_got,
            queue_depth,
            sessions_active,
            connects_rejected,
        })
    }

    pub fn record_put(&self, queue: &str, depth: usize) {
        self.messages_put.with_label_values(&[queue]).inc();
        self.queue_depth.with_label_values(&[queue]).set(depth as i64);
    }

    pub fn record_get(&self, queue: &str, depth: usize) {
        self.messages_got.with_label_values(&[queue]).inc();
        self.queue_depth.with_label_values(&[queue]).set(depth as i64);
    }

    pub fn record_rejected(&self, reason: &str) {
        self.connects_rejected.with_label_values(&[reason]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        use prometheus::{Encoder, TextEncoder};

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
