//! MySQL pools backed by `sqlx`.
//!
//! Endpoints are accepted in the go-sql-driver form
//! `user:pass@tcp(host:port)/dbname?charset=utf8mb4&parseTime=true&loc=Local`
//! or as `mysql://` URLs. Opening a pool only parses the endpoint and
//! configures the pool; connections are made lazily, so the first network
//! round trip happens on [`PoolHandle::ping`].
//!
//! `sqlx` has no idle-count ceiling. `PoolLimits::max_idle` is validated but
//! idle connections are reaped by `max_idle_time` instead.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;

use super::pool::PoolHandle;
use super::Connector;
use crate::config::PoolLimits;
use crate::error::AttemptError;

const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Opens `sqlx` MySQL pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    type Pool = MySqlPool;

    async fn open(&self, endpoint: &str, limits: &PoolLimits) -> Result<MySqlPool, AttemptError> {
        let options = parse_dsn(endpoint)?;
        Ok(pool_options(limits).connect_lazy_with(options))
    }
}

#[async_trait]
impl PoolHandle for MySqlPool {
    async fn ping(&self, deadline: Duration) -> Result<(), AttemptError> {
        let ping = async {
            let mut conn = self.acquire().await?;
            conn.ping().await
        };
        match tokio::time::timeout(deadline, ping).await {
            Ok(result) => result.map_err(AttemptError::from),
            Err(_) => Err(AttemptError::PingTimeout(deadline)),
        }
    }

    async fn close(&self) {
        sqlx::Pool::close(self).await;
    }
}

/// Pool options for the given limits.
pub fn pool_options(limits: &PoolLimits) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(limits.max_open)
        .min_connections(0)
        .max_lifetime(limits.max_lifetime)
        .idle_timeout(limits.max_idle_time)
        .acquire_timeout(limits.acquire_timeout)
}

/// Parse either DSN form into connect options.
pub fn parse_dsn(dsn: &str) -> Result<MySqlConnectOptions, AttemptError> {
    if dsn.starts_with("mysql://") || dsn.starts_with("mariadb://") {
        return MySqlConnectOptions::from_str(dsn).map_err(AttemptError::from);
    }
    Ok(DsnParts::parse(dsn)?.connect_options())
}

/// Fields of a `user:pass@tcp(host:port)/dbname?params` connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct DsnParts {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub charset: Option<String>,
}

impl DsnParts {
    pub fn parse(dsn: &str) -> Result<Self, AttemptError> {
        let at = dsn
            .find("@tcp(")
            .ok_or_else(|| AttemptError::invalid_dsn("expected user:pass@tcp(host:port)/dbname"))?;
        let user_info = &dsn[..at];
        let rest = &dsn[at + "@tcp(".len()..];

        let (user, password) = user_info.split_once(':').unwrap_or((user_info, ""));

        let close = rest
            .find(')')
            .ok_or_else(|| AttemptError::invalid_dsn("unterminated tcp( address"))?;
        let address = &rest[..close];
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AttemptError::invalid_dsn(format!("invalid port {port:?}")))?;
                (host, port)
            }
            None => (address, DEFAULT_MYSQL_PORT),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AttemptError::invalid_dsn("missing host"));
        }

        let path = rest[close + 1..]
            .strip_prefix('/')
            .ok_or_else(|| AttemptError::invalid_dsn("expected '/' after the address"))?;
        let (database, query) = path.split_once('?').unwrap_or((path, ""));

        let mut charset = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                AttemptError::invalid_dsn(format!("malformed parameter {pair:?}"))
            })?;
            // parseTime and loc only affect decoding, which the driver owns
            if key == "charset" {
                charset = Some(value.to_string());
            }
        }

        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            port,
            database: (!database.is_empty()).then(|| database.to_string()),
            charset,
        })
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        if let Some(charset) = &self.charset {
            options = options.charset(charset);
        }
        options
    }
}

impl std::fmt::Debug for DsnParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsnParts")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("charset", &self.charset)
            .finish()
    }
}
