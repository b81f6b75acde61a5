//! At-least-once event publishing with bounded, fixed-backoff retries.
//!
//! # Delivery semantics
//!
//! A message is written until the broker acknowledges it or the attempts run
//! out. A crash between the broker's acknowledgment and the caller observing
//! success can cause a duplicate on the next publish; no deduplication key is
//! added here. Callers that need exactly-once processing must embed their own
//! idempotency key in the event.
//!
//! # Dual writes
//!
//! A database write followed by [`EventPublisher::publish`] is not atomic.
//! When the publish fails after the write committed, the two stores disagree
//! and the caller has to compensate. Failures are counted in
//! `bustrack_events_publish_failed_total`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::PublishableEvent;
use crate::config::PublisherConfig;
use crate::error::{ConfigError, PublishError, WriteError};
use crate::metrics;
use crate::retry::{sleep_or_cancel, RetryAttempt};

/// A serialized event bound for a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Transport that hands messages to the broker.
///
/// Implementations must be safe for concurrent use; the publisher shares one
/// writer between all callers.
#[async_trait]
pub trait MessageWriter: Send + Sync + fmt::Debug {
    /// Write one message, returning once the broker acknowledged it.
    async fn write(&self, message: &OutboundMessage) -> Result<(), WriteError>;

    /// Release broker connections.
    async fn close(&self) -> Result<(), WriteError> {
        Ok(())
    }
}

/// Broker acknowledgment of a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub topic: String,
    /// Writes it took, including the successful one.
    pub attempts: u32,
}

/// Publishes events through a shared [`MessageWriter`].
#[derive(Clone)]
pub struct EventPublisher {
    writer: Arc<dyn MessageWriter>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl EventPublisher {
    /// Build a publisher from a writer and a resolved configuration.
    pub fn new(
        writer: Arc<dyn MessageWriter>,
        config: &PublisherConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            writer,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// Publish an event to its own topic.
    pub async fn publish_event<E: PublishableEvent>(
        &self,
        event: &E,
        cancel: &CancellationToken,
    ) -> Result<Ack, PublishError> {
        self.publish(E::TOPIC, event, cancel).await
    }

    /// Serialize `event` and write it to `topic`.
    ///
    /// Encoding failures are returned immediately without any write. Write
    /// failures are retried up to `max_retries` attempts in total, sleeping a
    /// fixed `retry_backoff` in between. `cancel` is checked before every write
    /// and before every sleep.
    pub async fn publish<E>(
        &self,
        topic: &str,
        event: &E,
        cancel: &CancellationToken,
    ) -> Result<Ack, PublishError>
    where
        E: Serialize + Sync + ?Sized,
    {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(source) => {
                metrics::record_publish_failed(topic, "encoding");
                warn!(topic, error = %source, "failed to encode event");
                return Err(PublishError::Encoding {
                    topic: topic.to_string(),
                    source,
                });
            }
        };
        let message = OutboundMessage {
            topic: topic.to_string(),
            payload,
        };

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(topic, attempt));
            }
            attempt += 1;

            let failed = match self.writer.write(&message).await {
                Ok(()) => {
                    metrics::record_event_published(topic, attempt);
                    info!(
                        topic,
                        attempt,
                        bytes = message.payload.len(),
                        "published event"
                    );
                    return Ok(Ack {
                        topic: topic.to_string(),
                        attempts: attempt,
                    });
                }
                Err(error) => RetryAttempt {
                    attempt,
                    max_attempts: self.max_retries,
                    error,
                },
            };

            warn!(
                topic,
                attempt,
                max_retries = self.max_retries,
                error = %failed.error,
                "publish attempt failed"
            );

            if !failed.has_remaining() {
                metrics::record_publish_failed(topic, "exhausted");
                return Err(PublishError::Exhausted {
                    topic: topic.to_string(),
                    attempts: attempt,
                    last: failed.error,
                });
            }

            if !sleep_or_cancel(self.retry_backoff, cancel).await {
                return Err(self.cancelled(topic, attempt));
            }
        }
    }

    /// Close the underlying writer.
    pub async fn close(&self) -> Result<(), WriteError> {
        self.writer.close().await
    }

    fn cancelled(&self, topic: &str, attempts: u32) -> PublishError {
        metrics::record_publish_failed(topic, "cancelled");
        PublishError::Cancelled {
            topic: topic.to_string(),
            attempts,
        }
    }
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("writer", &self.writer)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}
