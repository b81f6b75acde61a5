//! The process-wide pool handle and read-replica selection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::PoolLimits;
use crate::error::AttemptError;

/// Operations the connection manager needs from an opened pool.
#[async_trait]
pub trait PoolHandle: Clone + Send + Sync + 'static {
    /// Check that a connection can be acquired and answers within `deadline`.
    async fn ping(&self, deadline: Duration) -> Result<(), AttemptError>;

    /// Close every connection in the pool.
    async fn close(&self);
}

/// Chooses which replica serves a read.
///
/// Returning `None` routes the read to the primary.
pub trait ReplicaPolicy<P>: Send + Sync + fmt::Debug {
    fn resolve<'a>(&self, replicas: &'a [P]) -> Option<&'a P>;
}

/// Uniformly random replica selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPolicy;

impl<P> ReplicaPolicy<P> for RandomPolicy {
    fn resolve<'a>(&self, replicas: &'a [P]) -> Option<&'a P> {
        replicas.choose(&mut rand::thread_rng())
    }
}

/// Primary pool plus read replicas, shared by every caller in the process.
///
/// Cloning is cheap and yields a handle to the same pools. Only the owner
/// that established the pool should call [`LivePool::close`], and only during
/// shutdown.
#[derive(Clone)]
pub struct LivePool<P> {
    inner: Arc<LivePoolInner<P>>,
}

struct LivePoolInner<P> {
    primary: P,
    replicas: Vec<P>,
    policy: Arc<dyn ReplicaPolicy<P>>,
    limits: PoolLimits,
}

impl<P: PoolHandle> LivePool<P> {
    pub fn new(
        primary: P,
        replicas: Vec<P>,
        policy: Arc<dyn ReplicaPolicy<P>>,
        limits: PoolLimits,
    ) -> Self {
        Self {
            inner: Arc::new(LivePoolInner {
                primary,
                replicas,
                policy,
                limits,
            }),
        }
    }

    /// Pool for writes (always the primary).
    pub fn writer(&self) -> &P {
        &self.inner.primary
    }

    /// Pool for reads: a replica chosen by the policy, or the primary when no
    /// replicas are registered.
    pub fn reader(&self) -> &P {
        self.inner
            .policy
            .resolve(&self.inner.replicas)
            .unwrap_or(&self.inner.primary)
    }

    /// Registered replica pools, in configuration order.
    pub fn replicas(&self) -> &[P] {
        &self.inner.replicas
    }

    pub fn replica_count(&self) -> usize {
        self.inner.replicas.len()
    }

    /// Limits every pool was opened with.
    pub fn limits(&self) -> &PoolLimits {
        &self.inner.limits
    }

    /// Ping the primary within `deadline`.
    pub async fn ping(&self, deadline: Duration) -> Result<(), AttemptError> {
        self.inner.primary.ping(deadline).await
    }

    /// Close the primary and every replica.
    pub async fn close(&self) {
        debug!(replicas = self.inner.replicas.len(), "closing database pools");
        self.inner.primary.close().await;
        for replica in &self.inner.replicas {
            replica.close().await;
        }
        info!("database pools closed");
    }
}

impl<P> fmt::Debug for LivePool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivePool")
            .field("replica_count", &self.inner.replicas.len())
            .field("policy", &self.inner.policy)
            .field("limits", &self.inner.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_policy_empty_returns_none() {
        let replicas: Vec<u8> = Vec::new();
        for _ in 0..100 {
            assert!(RandomPolicy.resolve(&replicas).is_none());
        }
    }

    #[test]
    fn test_random_policy_reaches_every_replica() {
        let replicas = vec!["replica-1", "replica-2", "replica-3"];
        let mut hits = [0usize; 3];
        for _ in 0..3_000 {
            let chosen = RandomPolicy.resolve(&replicas).expect("non-empty");
            let index = replicas
                .iter()
                .position(|r| r == chosen)
                .expect("selection stays in range");
            hits[index] += 1;
        }
        assert!(hits.iter().all(|&h| h > 0), "starved replica: {hits:?}");
    }
}
