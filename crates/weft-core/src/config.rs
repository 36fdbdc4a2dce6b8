// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Weft Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL or file path
    pub database_url: String,
    /// Capacity of each instance actor's mailbox
    pub actor_mailbox_capacity: usize,
    /// Capacity of the runtime event broadcast channel
    pub event_channel_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `WEFT_DATABASE_URL`: SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `WEFT_ACTOR_MAILBOX_CAPACITY`: mailbox depth per actor (default: 64)
    /// - `WEFT_EVENT_CHANNEL_CAPACITY`: event channel depth (default: 256)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("WEFT_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("WEFT_DATABASE_URL"))?;

        let actor_mailbox_capacity: usize = std::env::var("WEFT_ACTOR_MAILBOX_CAPACITY")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("WEFT_ACTOR_MAILBOX_CAPACITY", "must be a positive integer")
            })?;
        if actor_mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "WEFT_ACTOR_MAILBOX_CAPACITY",
                "must be a positive integer",
            ));
        }

        let event_channel_capacity: usize = std::env::var("WEFT_EVENT_CHANNEL_CAPACITY")
            .unwrap_or_else(|_| "256".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("WEFT_EVENT_CHANNEL_CAPACITY", "must be a positive integer")
            })?;
        if event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "WEFT_EVENT_CHANNEL_CAPACITY",
                "must be a positive integer",
            ));
        }

        Ok(Self {
            database_url,
            actor_mailbox_capacity,
            event_channel_capacity,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            actor_mailbox_capacity: 64,
            event_channel_capacity: 256,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
