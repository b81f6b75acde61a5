//! Bus tracking connector library.
//!
//! This crate owns the two outbound connections every bus tracking service
//! needs: the primary/replica MySQL pools, established once at startup with
//! exponential backoff, and the Kafka event publisher, which retries each
//! event with a fixed delay. Configuration for both is resolved from the
//! environment. Services should depend on the items exported here rather than
//! talking to `sqlx` or `rskafka` directly.

pub mod config;
pub mod db;
pub mod env;
pub mod error;
pub mod events;
pub mod metrics;
pub mod retry;

pub use config::{mask_dsn, ConnectionConfig, DatabaseEndpoint, PoolLimits, PublisherConfig};
pub use db::{ConnectionManager, Connector, LivePool, MySqlConnector, PoolHandle, ReplicaPolicy};
pub use env::{EnvSource, ProcessEnv};
pub use error::{
    AttemptError, ConfigError, ConnectionError, Error, PublishError, Result, WriteError,
};
#[cfg(feature = "kafka")]
pub use events::KafkaWriter;
pub use events::{
    Ack, BusCreatedEvent, DriverLocationUpdatedEvent, EventPublisher, MessageWriter,
    OutboundMessage, PublishableEvent,
};
pub use retry::{ExponentialBackoff, FixedJitter, JitterSource, RandomJitter};
