//! Startup establishment of the primary/replica database pools.
//!
//! [`ConnectionManager::establish`] opens the primary, pings it, and retries
//! transient failures with exponential backoff plus jitter. Fatal failures end
//! the loop immediately. Once the primary answers, one pool per replica
//! endpoint is opened and pinged once within the connect timeout. Replicas
//! that fail either step are closed and left out; the replica policy is then
//! installed over the rest.
//!
//! Reconnecting after startup is left to the pool implementation.
//!
//! ```no_run
//! use bustrack_lib::config::ConnectionConfig;
//! use bustrack_lib::db::{ConnectionManager, MySqlConnector};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), bustrack_lib::ConnectionError> {
//! let config = ConnectionConfig::from_env();
//! let manager = ConnectionManager::new(MySqlConnector, config);
//! let pool = manager.establish(&CancellationToken::new()).await?;
//! let _reads = pool.reader();
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod mysql;
pub mod pool;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use classify::{classify, is_transient_mysql_code, FailureClass, TRANSIENT_MYSQL_CODES};
pub use mysql::{DsnParts, MySqlConnector};
pub use pool::{LivePool, PoolHandle, RandomPolicy, ReplicaPolicy};

use crate::config::{mask_dsn, ConnectionConfig, PoolLimits};
use crate::error::{AttemptError, ConnectionError};
use crate::metrics;
use crate::retry::{sleep_or_cancel, ExponentialBackoff, JitterSource, RandomJitter, RetryAttempt};

/// Opens pools for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Pool: PoolHandle;

    /// Parse `endpoint` and configure a pool with `limits`.
    async fn open(&self, endpoint: &str, limits: &PoolLimits) -> Result<Self::Pool, AttemptError>;
}

/// Establishes the process-wide [`LivePool`] once at startup.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: ConnectionConfig,
    jitter: Arc<dyn JitterSource>,
    policy: Arc<dyn ReplicaPolicy<C::Pool>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Manager with random jitter and random replica selection.
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            jitter: Arc::new(RandomJitter),
            policy: Arc::new(RandomPolicy),
        }
    }

    /// Replace the jitter source (tests inject a fixed one).
    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Replace the replica selection policy.
    pub fn with_policy(mut self, policy: impl ReplicaPolicy<C::Pool> + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connect to the primary, register replicas, and return the pool handle.
    ///
    /// `cancel` is checked before every attempt and before every backoff
    /// sleep; a sleep in progress ends as soon as it fires.
    pub async fn establish(
        &self,
        cancel: &CancellationToken,
    ) -> Result<LivePool<C::Pool>, ConnectionError> {
        self.config.validate()?;

        let primary = self.connect_primary(cancel).await?;
        let replicas = self.open_replicas().await;

        info!(
            replicas = replicas.len(),
            configured_replicas = self.config.replica_endpoints.len(),
            max_open = self.config.pool.max_open,
            max_idle = self.config.pool.max_idle,
            "database pools established"
        );

        Ok(LivePool::new(
            primary,
            replicas,
            Arc::clone(&self.policy),
            self.config.pool,
        ))
    }

    async fn connect_primary(
        &self,
        cancel: &CancellationToken,
    ) -> Result<C::Pool, ConnectionError> {
        let max_retries = self.config.max_retries;
        let backoff = ExponentialBackoff::new(self.config.retry_backoff, self.config.max_jitter);
        let endpoint = mask_dsn(&self.config.primary_endpoint);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ConnectionError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let failed = match self.try_primary().await {
                Ok(pool) => {
                    metrics::record_db_connect_attempt("success");
                    info!(attempt, endpoint = %endpoint, "connected to primary database");
                    return Ok(pool);
                }
                Err(error) => RetryAttempt {
                    attempt,
                    max_attempts: max_retries,
                    error,
                },
            };

            if !classify(&failed.error).is_transient() {
                metrics::record_db_connect_attempt("fatal");
                error!(
                    attempt,
                    endpoint = %endpoint,
                    error = %failed.error,
                    "non-transient database connection error"
                );
                return Err(ConnectionError::Fatal {
                    attempt,
                    source: failed.error,
                });
            }

            metrics::record_db_connect_attempt("transient");
            warn!(
                attempt,
                max_retries,
                endpoint = %endpoint,
                error = %failed.error,
                "database connection attempt failed"
            );

            if !failed.has_remaining() {
                return Err(ConnectionError::Exhausted {
                    attempts: attempt,
                    last: failed.error,
                });
            }

            let delay = backoff.delay(attempt, self.jitter.as_ref());
            debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before retry");
            if !sleep_or_cancel(delay, cancel).await {
                return Err(ConnectionError::Cancelled { attempts: attempt });
            }
        }
    }

    async fn try_primary(&self) -> Result<C::Pool, AttemptError> {
        let pool = self
            .connector
            .open(&self.config.primary_endpoint, &self.config.pool)
            .await?;

        match pool.ping(self.config.connect_timeout).await {
            Ok(()) => Ok(pool),
            Err(err) => {
                pool.close().await;
                Err(err)
            }
        }
    }

    async fn open_replicas(&self) -> Vec<C::Pool> {
        let mut replicas = Vec::with_capacity(self.config.replica_endpoints.len());

        for (index, endpoint) in self.config.replica_endpoints.iter().enumerate() {
            let pool = match self.connector.open(endpoint, &self.config.pool).await {
                Ok(pool) => pool,
                Err(err) => {
                    metrics::record_replica_excluded();
                    warn!(
                        replica = index,
                        endpoint = %mask_dsn(endpoint),
                        error = %err,
                        "excluding read replica that failed to open"
                    );
                    continue;
                }
            };

            if let Err(err) = pool.ping(self.config.connect_timeout).await {
                pool.close().await;
                metrics::record_replica_excluded();
                warn!(
                    replica = index,
                    endpoint = %mask_dsn(endpoint),
                    error = %err,
                    "excluding unreachable read replica"
                );
                continue;
            }

            debug!(replica = index, endpoint = %mask_dsn(endpoint), "registered read replica");
            replicas.push(pool);
        }

        replicas
    }
}

impl<C: Connector + std::fmt::Debug> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connector", &self.connector)
            .field("config", &self.config)
            .field("jitter", &self.jitter)
            .field("policy", &self.policy)
            .finish()
    }
}
