//! Typed environment variable lookups
//!
//! Blank values are treated the same as unset ones so that a `.env` entry like
//! `BATCHLOAD_DATA_DIR=` falls back to the default instead of an empty path.

use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// An environment variable was set but could not be interpreted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value for {key}: '{value}' ({reason})")]
pub struct EnvError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Read a string variable, falling back to `default` when unset or blank.
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

/// Parse a variable into `T`.
///
/// Unset or blank yields `default`. A present but unparseable value is an
/// error rather than a silent fallback.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, EnvError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| EnvError {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_or_falls_back_on_blank() {
        std::env::set_var("BATCHLOAD_TEST_STR", "   ");
        assert_eq!(env_or("BATCHLOAD_TEST_STR", "fallback"), "fallback");

        std::env::set_var("BATCHLOAD_TEST_STR", "value");
        assert_eq!(env_or("BATCHLOAD_TEST_STR", "fallback"), "value");

        std::env::remove_var("BATCHLOAD_TEST_STR");
        assert_eq!(env_or("BATCHLOAD_TEST_STR", "fallback"), "fallback");
    }

    #[test]
    #[serial]
    fn test_env_parse_reports_bad_values() {
        std::env::set_var("BATCHLOAD_TEST_NUM", " 42 ");
        assert_eq!(env_parse::<u32>("BATCHLOAD_TEST_NUM", 7).unwrap(), 42);

        std::env::set_var("BATCHLOAD_TEST_NUM", "forty-two");
        let err = env_parse::<u32>("BATCHLOAD_TEST_NUM", 7).unwrap_err();
        assert_eq!(err.key, "BATCHLOAD_TEST_NUM");
        assert_eq!(err.value, "forty-two");

        std::env::remove_var("BATCHLOAD_TEST_NUM");
        assert_eq!(env_parse::<u32>("BATCHLOAD_TEST_NUM", 7).unwrap(), 7);
    }
}
