//! Kafka transport for [`EventPublisher`](super::EventPublisher).
//!
//! The broker client is created on first write so that building the writer
//! never blocks startup. Each topic gets one batching producer writing to
//! partition 0; records written within `batch_timeout` of each other are sent
//! in one request. A producer whose write fails is dropped and rebuilt on the
//! next attempt.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::UnknownTopicHandling;
use rskafka::client::producer::aggregator::RecordAggregator;
use rskafka::client::producer::{BatchProducer, BatchProducerBuilder};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::publisher::{MessageWriter, OutboundMessage};
use crate::config::PublisherConfig;
use crate::error::WriteError;

const PARTITION: i32 = 0;
const MAX_BATCH_BYTES: usize = 1024 * 1024;

type Producer = Arc<BatchProducer<RecordAggregator>>;

/// [`MessageWriter`] backed by an `rskafka` client.
pub struct KafkaWriter {
    brokers: Vec<String>,
    batch_timeout: Duration,
    client: OnceCell<Client>,
    producers: Mutex<HashMap<String, Producer>>,
    closed: AtomicBool,
}

impl KafkaWriter {
    /// Writer for the brokers in `config.broker_addr` (comma separated).
    pub fn new(config: &PublisherConfig) -> Self {
        let brokers = config
            .broker_addr
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            brokers,
            batch_timeout: config.batch_timeout,
            client: OnceCell::new(),
            producers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    async fn client(&self) -> Result<&Client, WriteError> {
        self.client
            .get_or_try_init(|| async {
                debug!(brokers = ?self.brokers, "connecting to kafka");
                ClientBuilder::new(self.brokers.clone())
                    .build()
                    .await
                    .map_err(|e| WriteError::Unavailable(e.to_string()))
            })
            .await
    }

    async fn producer(&self, topic: &str) -> Result<Producer, WriteError> {
        let mut producers = self.producers.lock().await;
        // `close` may have cleared the map after `write` checked the flag.
        if self.closed.load(Ordering::Acquire) {
            return Err(WriteError::Closed);
        }
        if let Some(producer) = producers.get(topic) {
            return Ok(Arc::clone(producer));
        }

        let partition = self
            .client()
            .await?
            .partition_client(topic.to_string(), PARTITION, UnknownTopicHandling::Error)
            .await
            .map_err(|e| WriteError::Unavailable(e.to_string()))?;
        let producer = Arc::new(
            BatchProducerBuilder::new(Arc::new(partition))
                .with_linger(self.batch_timeout)
                .build(RecordAggregator::new(MAX_BATCH_BYTES)),
        );
        producers.insert(topic.to_string(), Arc::clone(&producer));
        Ok(producer)
    }

    async fn evict(&self, topic: &str) {
        self.producers.lock().await.remove(topic);
    }
}

#[async_trait]
impl MessageWriter for KafkaWriter {
    async fn write(&self, message: &OutboundMessage) -> Result<(), WriteError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WriteError::Closed);
        }

        let producer = self.producer(&message.topic).await?;
        let record = Record {
            key: None,
            value: Some(message.payload.clone()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        match producer.produce(record).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.evict(&message.topic).await;
                Err(WriteError::Unavailable(e.to_string()))
            }
        }
    }

    async fn close(&self) -> Result<(), WriteError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let dropped = {
            let mut producers = self.producers.lock().await;
            let count = producers.len();
            producers.clear();
            count
        };
        info!(producers = dropped, "kafka writer closed");
        Ok(())
    }
}

impl fmt::Debug for KafkaWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaWriter")
            .field("brokers", &self.brokers)
            .field("batch_timeout", &self.batch_timeout)
            .field("connected", &self.client.initialized())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
