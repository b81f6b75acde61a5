//! Transient/fatal classification of connection failures.
//!
//! Only failures that are known to clear up on their own are transient:
//! network dial/read/write errors, pool acquire timeouts, the per-attempt ping
//! deadline, and a short list of MySQL server codes. Everything else,
//! including errors this module does not recognise, is fatal so that a
//! misconfigured service fails fast instead of retrying a condition that can
//! never succeed.

use std::io;

use sqlx::mysql::MySqlDatabaseError;

use crate::error::AttemptError;

/// MySQL error numbers treated as transient.
///
/// - 1040 too many connections
/// - 1053 server shutdown in progress
/// - 1205 lock wait timeout exceeded
/// - 1213 deadlock found
/// - 2002 cannot connect through socket
/// - 2003 cannot connect to server
/// - 2006 server has gone away
/// - 2013 lost connection during query
pub const TRANSIENT_MYSQL_CODES: &[u16] = &[1040, 1053, 1205, 1213, 2002, 2003, 2006, 2013];

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Fatal,
}

impl FailureClass {
    pub fn is_transient(self) -> bool {
        self == FailureClass::Transient
    }
}

/// Classify a failed connection attempt.
pub fn classify(error: &AttemptError) -> FailureClass {
    match error {
        AttemptError::PingTimeout(_) => FailureClass::Transient,
        AttemptError::InvalidDsn { .. } => FailureClass::Fatal,
        AttemptError::Driver(err) => classify_driver(err),
    }
}

/// Whether a MySQL server error number is in the transient set.
pub fn is_transient_mysql_code(code: u16) -> bool {
    TRANSIENT_MYSQL_CODES.contains(&code)
}

fn classify_driver(error: &sqlx::Error) -> FailureClass {
    match error {
        sqlx::Error::Io(err) => classify_io(err.kind()),
        sqlx::Error::PoolTimedOut => FailureClass::Transient,
        sqlx::Error::Database(db_err) => match db_err.try_downcast_ref::<MySqlDatabaseError>() {
            Some(mysql) if is_transient_mysql_code(mysql.number()) => FailureClass::Transient,
            _ => FailureClass::Fatal,
        },
        _ => FailureClass::Fatal,
    }
}

fn classify_io(kind: io::ErrorKind) -> FailureClass {
    match kind {
        io::ErrorKind::PermissionDenied
        | io::ErrorKind::InvalidInput
        | io::ErrorKind::Unsupported => FailureClass::Fatal,
        _ => FailureClass::Transient,
    }
}
