//! Application state shared by the axum handlers.
//!
//! The state owns the process-wide database pool and event publisher. It is
//! built once by the composition root and handed to handlers through axum's
//! `State` extractor; nothing else reaches for globals.

use std::fmt;
use std::sync::Arc;

use bustrack_lib::config::{ConnectionConfig, PublisherConfig};
use bustrack_lib::db::{ConnectionManager, LivePool, MySqlConnector, PoolHandle};
use bustrack_lib::events::{EventPublisher, KafkaWriter};
use bustrack_lib::Result;
use sqlx::mysql::MySqlPool;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state for all handlers.
///
/// Cheap to clone; every clone refers to the same pool and publisher.
pub struct AppState<P = MySqlPool> {
    inner: Arc<AppStateInner<P>>,
}

struct AppStateInner<P> {
    pool: LivePool<P>,
    publisher: EventPublisher,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl AppState<MySqlPool> {
    /// Establish MySQL and build the Kafka publisher.
    ///
    /// Blocks through the database retry loop; `cancel` aborts it.
    pub async fn connect(
        db: ConnectionConfig,
        events: &PublisherConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let pool = ConnectionManager::new(MySqlConnector, db)
            .establish(cancel)
            .await?;

        let writer = Arc::new(KafkaWriter::new(events));
        let publisher = match EventPublisher::new(writer, events) {
            Ok(publisher) => publisher,
            Err(err) => {
                pool.close().await;
                return Err(err.into());
            }
        };

        info!(
            replicas = pool.replica_count(),
            broker = %events.broker_addr,
            "application state ready"
        );
        Ok(Self::new(pool, publisher))
    }
}

impl<P: PoolHandle> AppState<P> {
    /// Wrap an established pool and a publisher.
    pub fn new(pool: LivePool<P>, publisher: EventPublisher) -> Self {
        Self {
            inner: Arc::new(AppStateInner { pool, publisher }),
        }
    }

    pub fn pool(&self) -> &LivePool<P> {
        &self.inner.pool
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.inner.publisher
    }

    /// Close the publisher, then the database pools.
    ///
    /// The pools are closed even when the publisher fails to close.
    pub async fn shutdown(&self) -> Result<()> {
        let closed = self.inner.publisher.close().await;
        self.inner.pool.close().await;
        closed?;
        info!("application state shut down");
        Ok(())
    }
}

impl<P> fmt::Debug for AppState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("pool", &self.inner.pool)
            .field("publisher", &self.inner.publisher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_state, StaticPool};
    use async_trait::async_trait;
    use bustrack_lib::config::PoolLimits;
    use bustrack_lib::db::RandomPolicy;
    use bustrack_lib::error::{ConfigError, ConnectionError, Error, WriteError};
    use bustrack_lib::events::{MessageWriter, OutboundMessage};

    #[derive(Debug)]
    struct StuckWriter;

    #[async_trait]
    impl MessageWriter for StuckWriter {
        async fn write(&self, _message: &OutboundMessage) -> std::result::Result<(), WriteError> {
            Ok(())
        }

        async fn close(&self) -> std::result::Result<(), WriteError> {
            Err(WriteError::Unavailable("flush timed out".to_string()))
        }
    }

    #[tokio::test]
    async fn test_clones_share_pool() {
        let state = test_state(true);
        let clone = state.clone();
        assert!(std::ptr::eq(state.pool().writer(), clone.pool().writer()));
    }

    #[tokio::test]
    async fn test_shutdown_closes_pool() {
        let state = test_state(true);
        state.shutdown().await.expect("clean shutdown");
        assert!(StaticPool::is_closed(state.pool().writer()));
    }

    #[tokio::test]
    async fn test_shutdown_reports_writer_failure_after_closing_pool() {
        let pool = LivePool::new(
            StaticPool::new(true),
            Vec::new(),
            Arc::new(RandomPolicy),
            PoolLimits::default(),
        );
        let publisher =
            EventPublisher::new(Arc::new(StuckWriter), &PublisherConfig::default()).unwrap();
        let state = AppState::new(pool, publisher);

        let err = state.shutdown().await.unwrap_err();
        assert!(matches!(err, Error::Write(WriteError::Unavailable(_))));
        assert!(StaticPool::is_closed(state.pool().writer()));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let db = ConnectionConfig::new("root:pw@tcp(127.0.0.1:1)/app").with_max_retries(0);
        let err = AppState::<MySqlPool>::connect(db, &PublisherConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::InvalidConfig(ConfigError::ZeroRetries { .. }))
        ));
    }

    #[test]
    fn test_error_display() {
        let err = Error::from(ConfigError::ZeroRetries {
            setting: "KAFKA_MAX_RETRIES",
        });
        assert_eq!(err.to_string(), "KAFKA_MAX_RETRIES must be at least 1");
    }
}
