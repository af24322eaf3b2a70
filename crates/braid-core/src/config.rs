//! Process configuration loaded from the environment.

use std::time::Duration;

use braid_crypto::MasterKey;

use crate::error::{Error, Result};

/// Default keep-alive interval for live subscribers, in seconds.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 25;

/// Default per-subscriber event buffer, in frames.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Server configuration.
///
/// The master key is loaded once at startup and held only in memory; it is
/// never persisted or logged (its `Debug` form is redacted).
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server-wide master key for public notes and key wrapping.
    pub master_key: MasterKey,
    /// Interval between keep-alive pings to live subscribers.
    pub keepalive: Duration,
    /// Per-subscriber event buffer size, in frames.
    pub event_capacity: usize,
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    ///
    /// - `DATABASE_URL` - required
    /// - `BRAID_MASTER_KEY` - required, 64 hex characters (32 bytes)
    /// - `BRAID_KEEPALIVE_SECS` - optional, defaults to 25
    /// - `BRAID_EVENT_CAPACITY` - optional, defaults to 64
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Config("DATABASE_URL is not set".to_string()))?;

        let key_hex = std::env::var("BRAID_MASTER_KEY")
            .map_err(|_| Error::Config("BRAID_MASTER_KEY is not set".to_string()))?;
        let master_key = MasterKey::from_hex(&key_hex)
            .map_err(|_| Error::Config("BRAID_MASTER_KEY must be 64 hex characters".to_string()))?;

        let keepalive_secs = match std::env::var("BRAID_KEEPALIVE_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|_| Error::Config("BRAID_KEEPALIVE_SECS must be an integer".to_string()))?,
            Err(_) => DEFAULT_KEEPALIVE_SECS,
        };

        let event_capacity = match std::env::var("BRAID_EVENT_CAPACITY") {
            Ok(v) => v
                .parse::<usize>()
                .map_err(|_| Error::Config("BRAID_EVENT_CAPACITY must be an integer".to_string()))?,
            Err(_) => DEFAULT_EVENT_CAPACITY,
        };

        Ok(Self {
            database_url,
            master_key,
            keepalive: Duration::from_secs(keepalive_secs),
            event_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_debug_redacts_master_key() {
        let config = Config {
            database_url: "postgres://localhost/braid".to_string(),
            master_key: MasterKey::new([0xCD; 32]),
            keepalive: Duration::from_secs(25),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("cd"));
    }

    #[test]
    fn test_default_keepalive() {
        assert_eq!(DEFAULT_KEEPALIVE_SECS, 25);
    }
}
