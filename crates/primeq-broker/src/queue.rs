use crate::config::QueueConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use primeq_protocol::Envelope;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue {queue} is full (max depth {max_depth})")]
    Full { queue: String, max_depth: usize },
}

/// In-memory FIFO queue with bounded depth
pub struct MessageQueue {
    name: String,
    max_depth: usize,
    messages: Mutex<VecDeque<Envelope>>,
    available: Notify,
}

impl MessageQueue {
    pub fn new(name: impl Into<String>, max_depth: usize) -> Self {
        MessageQueue {
            name: name.into(),
            max_depth,
            messages: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a message, returning the new depth
    pub fn put(&self, envelope: Envelope) -> Result<usize, QueueError> {
        let depth = {
            let mut messages = self.messages.lock();
            if messages.len() >= self.max_depth {
                return Err(QueueError::Full {
                    queue: self.name.clone(),
                    max_depth: self.max_depth,
                });
            }
            messages.push_back(envelope);
            messages.len()
        };

        self.available.notify_waiters();
        Ok(depth)
    }

    pub fn try_get(&self) -> Option<Envelope> {
        self.messages.lock().pop_front()
    }

    /// Take the oldest message, parking up to `wait` for one to arrive
    pub async fn get_wait(&self, wait: Duration) -> Option<Envelope> {
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a put between the check and the
            // await still wakes this waiter
            notified.as_mut().enable();

            if let Some(envelope) = self.try_get() {
                return Some(envelope);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_get();
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.messages.lock().len()
    }
}

/// The set of queues hosted by the queue manager
pub struct QueueRegistry {
    queues: DashMap<String, Arc<MessageQueue>>,
}

impl QueueRegistry {
    pub fn new(configs: &[QueueConfig]) -> Self {
        let queues = DashMap::new();
        for config in configs {
            queues.insert(
                config.name.clone(),
                Arc::new(MessageQueue::new(config.name.clone(), config.max_depth)),
            );
        }
        QueueRegistry { queues }
    }

    pub fn get(&self, name: &str) -> Option<Arc<MessageQueue>> {
        self.queues.get(name).map(|q| q.value().clone())
    }

    /// (name, depth) for every queue, sorted by name
    pub fn depths(&self) -> Vec<(String, usize)> {
        let mut depths: Vec<(String, usize)> = self
            .queues
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().depth()))
            .collect();
        depths.sort();
        depths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(body: &str) -> Envelope {
        Envelope::new(body.as_bytes().to_vec())
    }

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new("Q", 10);
        queue.put(envelope("a")).unwrap();
        queue.put(envelope("b")).unwrap();

        assert_eq!(queue.try_get().unwrap().payload, b"a");
        assert_eq!(queue.try_get().unwrap().payload, b"b");
        assert!(queue.try_get().is_none());
    }

    #[test]
    fn test_max_depth() {
        let queue = MessageQueue::new("Q", 1);
        assert_eq!(queue.put(envelope("a")).unwrap(), 1);
        assert_eq!(
            queue.put(envelope("b")),
            Err(QueueError::Full {
                queue: "Q".to_string(),
                max_depth: 1
            })
        );
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_get_wait_times_out_when_empty() {
        let queue = MessageQueue::new("Q", 10);
        let started = Instant::now();

        assert!(queue.get_wait(Duration::from_millis(50)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_get_wait_wakes_on_put() {
        let queue = Arc::new(MessageQueue::new("Q", 10));

        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.put(envelope("late")).unwrap();
        });

        let started = Instant::now();
        let received = queue.get_wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(received.payload, b"late");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = QueueRegistry::new(&[
            QueueConfig {
                name: "B".to_string(),
                max_depth: 5,
            },
            QueueConfig {
                name: "A".to_string(),
                max_depth: 5,
            },
        ]);

        assert!(registry.get("A").is_some());
        assert!(registry.get("C").is_none());

        registry.get("B").unwrap().put(envelope("x")).unwrap();
        assert_eq!(
            registry.depths(),
            vec![("A".to_string(), 0), ("B".to_string(), 1)]
        );
    }
}
