use std::time::Duration;

use thiserror::Error;

/// Convenient result alias for the bus tracking library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when a configuration snapshot violates its invariants.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Raised when the database could not be established at startup.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Raised when an event could not be delivered to the broker.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Raised when the broker writer could not be created or closed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Retry loops need at least one attempt.
    #[error("{setting} must be at least 1")]
    ZeroRetries { setting: &'static str },

    /// A pool must be allowed at least one open connection.
    #[error("max_open must be at least 1")]
    ZeroMaxOpen,

    /// The idle ceiling may not exceed the open ceiling.
    #[error("max_idle ({max_idle}) must not exceed max_open ({max_open})")]
    IdleExceedsOpen { max_idle: u32, max_open: u32 },

    /// The primary database endpoint is empty.
    #[error("primary database endpoint is not configured")]
    MissingPrimary,
}

/// A single failed attempt to open or ping a database pool.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Error reported by the database driver.
    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    /// The ping did not complete before the per-attempt deadline.
    #[error("ping did not complete within {0:?}")]
    PingTimeout(Duration),

    /// The connection string could not be parsed.
    #[error("malformed DSN: {reason}")]
    InvalidDsn { reason: String },
}

impl AttemptError {
    pub(crate) fn invalid_dsn(reason: impl Into<String>) -> Self {
        AttemptError::InvalidDsn {
            reason: reason.into(),
        }
    }
}

/// Failure to establish the database at startup.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The configuration snapshot was rejected before any attempt was made.
    #[error("invalid connection configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A non-retryable error ended the retry loop early.
    #[error("non-transient database error on attempt {attempt}: {source}")]
    Fatal {
        attempt: u32,
        #[source]
        source: AttemptError,
    },

    /// Every attempt failed with a transient error.
    #[error("failed to connect to database after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: AttemptError,
    },

    /// The caller cancelled the operation.
    #[error("database connection cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl ConnectionError {
    /// True when retrying later cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Fatal { .. } | ConnectionError::InvalidConfig(_)
        )
    }

    /// True when the loop ran out of attempts on transient failures.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ConnectionError::Exhausted { .. })
    }

    /// Number of connection attempts that were started.
    pub fn attempts(&self) -> u32 {
        match self {
            ConnectionError::InvalidConfig(_) => 0,
            ConnectionError::Fatal { attempt, .. } => *attempt,
            ConnectionError::Exhausted { attempts, .. } => *attempts,
            ConnectionError::Cancelled { attempts } => *attempts,
        }
    }
}

/// A single failed write to the message broker.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The broker could not be reached or the connection dropped.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The broker answered but refused the message.
    #[error("broker rejected message: {0}")]
    Rejected(String),

    /// The writer has already been closed.
    #[error("writer is closed")]
    Closed,
}

/// Failure to publish an event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event could not be serialized; never retried.
    #[error("failed to encode event for topic {topic}: {source}")]
    Encoding {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Every write attempt failed.
    #[error("failed to publish to topic {topic} after {attempts} attempts: {last}")]
    Exhausted {
        topic: String,
        attempts: u32,
        #[source]
        last: WriteError,
    },

    /// The caller cancelled the operation.
    #[error("publish to topic {topic} cancelled after {attempts} attempts")]
    Cancelled { topic: String, attempts: u32 },
}

impl PublishError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PublishError::Encoding { .. } => "encoding",
            PublishError::Exhausted { .. } => "exhausted",
            PublishError::Cancelled { .. } => "cancelled",
        }
    }

    /// True when the failure came from serialization rather than the broker.
    pub fn is_encoding(&self) -> bool {
        matches!(self, PublishError::Encoding { .. })
    }

    /// True when all write attempts were used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PublishError::Exhausted { .. })
    }
}
