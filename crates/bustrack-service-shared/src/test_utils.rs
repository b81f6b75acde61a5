//! Test doubles for handler testing without MySQL or Kafka.
//!
//! Enable the `test-utils` feature to use these from another crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bustrack_lib::config::{PoolLimits, PublisherConfig};
use bustrack_lib::db::{LivePool, PoolHandle, RandomPolicy};
use bustrack_lib::error::{AttemptError, WriteError};
use bustrack_lib::events::{EventPublisher, MessageWriter, OutboundMessage};

use crate::state::AppState;

/// Pool whose ping succeeds or times out depending on `healthy`.
#[derive(Debug, Clone)]
pub struct StaticPool {
    healthy: bool,
    closed: Arc<AtomicBool>,
}

impl StaticPool {
    pub fn new(healthy: bool) -> Self {
        Self {
            healthy,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolHandle for StaticPool {
    async fn ping(&self, deadline: Duration) -> Result<(), AttemptError> {
        if self.healthy {
            Ok(())
        } else {
            Err(AttemptError::PingTimeout(deadline))
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Writer that accepts and discards every message.
#[derive(Debug, Default)]
pub struct DiscardWriter;

#[async_trait]
impl MessageWriter for DiscardWriter {
    async fn write(&self, _message: &OutboundMessage) -> Result<(), WriteError> {
        Ok(())
    }
}

/// State with one replica and a discarding publisher.
///
/// `healthy` controls whether the primary answers pings.
pub fn test_state(healthy: bool) -> AppState<StaticPool> {
    let pool = LivePool::new(
        StaticPool::new(healthy),
        vec![StaticPool::new(true)],
        Arc::new(RandomPolicy),
        PoolLimits::default(),
    );
    let publisher = EventPublisher::new(Arc::new(DiscardWriter), &PublisherConfig::default())
        .unwrap_or_else(|e| panic!("default publisher config rejected: {e}"));
    AppState::new(pool, publisher)
}
