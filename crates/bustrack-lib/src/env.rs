//! Typed lookups of environment settings with silent defaults.
//!
//! Missing keys and values that fail to parse both resolve to the supplied
//! default. Nothing here reports an error; validation of the resulting
//! configuration happens when it is used.
//!
//! Durations use human-readable syntax such as `500ms`, `5s`, `1h 30m` or
//! `1h30m`.
//!
//! ```
//! use std::collections::HashMap;
//! use std::time::Duration;
//! use bustrack_lib::env::EnvSource;
//!
//! let vars = HashMap::from([("DB_RETRY_BACKOFF".to_string(), "250ms".to_string())]);
//! assert_eq!(
//!     vars.get_duration("DB_RETRY_BACKOFF", Duration::from_secs(1)),
//!     Duration::from_millis(250)
//! );
//! assert_eq!(vars.get_int("DB_MAX_RETRIES", 10u32), 10);
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// A source of string settings keyed by name.
pub trait EnvSource {
    /// Raw value for `key`, if present.
    fn var(&self, key: &str) -> Option<String>;

    /// Integer setting parsed as `T`, or `default` when missing or invalid.
    fn get_int<T: FromStr>(&self, key: &str, default: T) -> T {
        self.var(key)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Duration setting, or `default` when missing or invalid.
    fn get_duration(&self, key: &str, default: Duration) -> Duration {
        self.var(key)
            .and_then(|value| humantime::parse_duration(value.trim()).ok())
            .unwrap_or(default)
    }

    /// String setting, or `default` when missing.
    fn get_string(&self, key: &str, default: &str) -> String {
        self.var(key).unwrap_or_else(|| default.to_string())
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Read an integer setting from the process environment.
pub fn get_int<T: FromStr>(key: &str, default: T) -> T {
    ProcessEnv.get_int(key, default)
}

/// Read a duration setting from the process environment.
pub fn get_duration(key: &str, default: Duration) -> Duration {
    ProcessEnv.get_duration(key, default)
}

/// Read a string setting from the process environment.
pub fn get_string(key: &str, default: &str) -> String {
    ProcessEnv.get_string(key, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_int_parses_value() {
        let env = vars(&[("DB_MAX_RETRIES", "3")]);
        assert_eq!(env.get_int("DB_MAX_RETRIES", 10u32), 3);
    }

    #[test]
    fn test_get_int_falls_back_on_missing_and_garbage() {
        let env = vars(&[("DB_MAX_RETRIES", "three"), ("NEGATIVE", "-1")]);
        assert_eq!(env.get_int("DB_MAX_RETRIES", 10u32), 10);
        assert_eq!(env.get_int("NOT_SET", 7u32), 7);
        // negative values do not fit an unsigned target
        assert_eq!(env.get_int("NEGATIVE", 5u32), 5);
        assert_eq!(env.get_int("NEGATIVE", 5i64), -1);
    }

    #[test]
    fn test_get_duration_formats() {
        let env = vars(&[
            ("A", "500ms"),
            ("B", "5s"),
            ("C", "1h 30m"),
            ("D", "1h30m"),
            ("E", "soon"),
        ]);
        let default = Duration::from_secs(1);
        assert_eq!(env.get_duration("A", default), Duration::from_millis(500));
        assert_eq!(env.get_duration("B", default), Duration::from_secs(5));
        assert_eq!(env.get_duration("C", default), Duration::from_secs(5400));
        assert_eq!(env.get_duration("D", default), Duration::from_secs(5400));
        assert_eq!(env.get_duration("E", default), default);
        assert_eq!(env.get_duration("MISSING", default), default);
    }

    #[test]
    fn test_get_string_default() {
        let env = vars(&[("KAFKA_BROKER_ADDR", "kafka:9092")]);
        assert_eq!(env.get_string("KAFKA_BROKER_ADDR", "x"), "kafka:9092");
        assert_eq!(env.get_string("MISSING", "localhost:9092"), "localhost:9092");
    }

    #[test]
    #[serial]
    fn test_process_env_lookup() {
        std::env::set_var("BUSTRACK_TEST_INT", "42");
        std::env::set_var("BUSTRACK_TEST_DURATION", "20ms");
        std::env::set_var("BUSTRACK_TEST_BROKER", "kafka-0:9092");

        assert_eq!(get_int("BUSTRACK_TEST_INT", 0u32), 42);
        assert_eq!(
            get_duration("BUSTRACK_TEST_DURATION", Duration::ZERO),
            Duration::from_millis(20)
        );
        assert_eq!(get_string("BUSTRACK_TEST_BROKER", "localhost:9092"), "kafka-0:9092");

        std::env::remove_var("BUSTRACK_TEST_INT");
        std::env::remove_var("BUSTRACK_TEST_DURATION");
        std::env::remove_var("BUSTRACK_TEST_BROKER");

        assert_eq!(get_int("BUSTRACK_TEST_INT", 0u32), 0);
        assert_eq!(get_string("BUSTRACK_TEST_BROKER", "localhost:9092"), "localhost:9092");
    }
}
