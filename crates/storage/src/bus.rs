//! Event bus adapters for publishing canonical observations.

use std::sync::Mutex;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, Client};
use tracing::debug;
use uuid::Uuid;

use zephyr_common::{CanonicalObservation, IngestError, IngestResult};

/// Acknowledgement of a single published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub event_id: Uuid,
    /// Position of the event on the bus, e.g. a Redis stream entry id.
    pub entry_id: String,
}

/// Where canonical observations are sent.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &CanonicalObservation) -> IngestResult<PublishAck>;
}

/// Publishes each event as an entry on a Redis stream named after the topic.
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    max_len: Option<usize>,
}

impl RedisStreamPublisher {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str) -> IngestResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            IngestError::configuration("Redis connection failed").with_detail(e)
        })?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| IngestError::publish("Redis connection failed").with_detail(e))?;

        Ok(Self { conn, max_len: None })
    }

    /// Trim each stream to roughly this many entries.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, topic: &str, event: &CanonicalObservation) -> IngestResult<PublishAck> {
        let event_id = Uuid::new_v4();
        let data = serde_json::to_string(event)
            .map_err(|e| IngestError::publish("Serialization failed").with_detail(e))?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(topic);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*")
            .arg("event_id")
            .arg(event_id.to_string())
            .arg("data")
            .arg(&data);

        let mut conn = self.conn.clone();
        let entry_id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| IngestError::publish(format!("Publish to '{}' failed", topic)).with_detail(e))?;

        debug!(topic, %event_id, entry_id = %entry_id, "Published event");
        Ok(PublishAck { event_id, entry_id })
    }
}

/// Records published events in memory. Used by tests and `--dry-run`.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<(String, CanonicalObservation)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event published so far, with its topic, in publish order.
    pub fn events(&self) -> Vec<(String, CanonicalObservation)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, event: &CanonicalObservation) -> IngestResult<PublishAck> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| IngestError::publish("In-memory bus is poisoned"))?;
        events.push((topic.to_string(), event.clone()));

        Ok(PublishAck {
            event_id: Uuid::new_v4(),
            entry_id: events.len().to_string(),
        })
    }
}
