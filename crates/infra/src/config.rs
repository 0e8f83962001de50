//! Session store configuration, read from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `SCHOOLGATE_RESOLVER_MAX_ATTEMPTS` | `2` |
//! | `SCHOOLGATE_RESOLVER_BACKOFF_MS` | `100` |
//! | `SCHOOLGATE_NAVIGATION_BUFFER` | `16` |

use std::time::Duration;

use thiserror::Error;

use crate::membership::RetryPolicy;

pub const ENV_RESOLVER_MAX_ATTEMPTS: &str = "SCHOOLGATE_RESOLVER_MAX_ATTEMPTS";
pub const ENV_RESOLVER_BACKOFF_MS: &str = "SCHOOLGATE_RESOLVER_BACKOFF_MS";
pub const ENV_NAVIGATION_BUFFER: &str = "SCHOOLGATE_NAVIGATION_BUFFER";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStoreConfig {
    pub resolver_retry: RetryPolicy,
    /// Capacity of the navigation-signal channel. Slow receivers past this
    /// many signals observe a lag instead of blocking the store.
    pub navigation_buffer: usize,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            resolver_retry: RetryPolicy::default(),
            navigation_buffer: 16,
        }
    }
}

impl SessionStoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_attempts: u32 = parse(&lookup, ENV_RESOLVER_MAX_ATTEMPTS)?
            .unwrap_or(defaults.resolver_retry.max_attempts);
        if max_attempts == 0 {
            return Err(invalid(ENV_RESOLVER_MAX_ATTEMPTS, "0", "must be at least 1"));
        }

        let backoff = parse::<u64>(&lookup, ENV_RESOLVER_BACKOFF_MS)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.resolver_retry.backoff);

        let navigation_buffer: usize =
            parse(&lookup, ENV_NAVIGATION_BUFFER)?.unwrap_or(defaults.navigation_buffer);
        if navigation_buffer == 0 {
            return Err(invalid(ENV_NAVIGATION_BUFFER, "0", "must be at least 1"));
        }

        Ok(Self {
            resolver_retry: RetryPolicy::new(max_attempts, backoff),
            navigation_buffer,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err: T::Err| invalid(key, &raw, &err.to_string())),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
