use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::session::DEFAULT_CONNECT_TIMEOUT;

pub const DEFAULT_AUDIT_COLLECTION: &str = "cig-news";
pub const DEFAULT_WATCH_BUFFER: usize = 64;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// What a [`Session`](crate::Session) needs to connect.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub uri: String,
    pub database: String,
    pub audit_collection: String,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            audit_collection: DEFAULT_AUDIT_COLLECTION.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub session: SessionConfig,
    pub watch_buffer: usize,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let uri = lookup("MONGODB_URI").context("MONGODB_URI not set")?;
        let database = lookup("MONGODB_DATABASE").context("MONGODB_DATABASE not set")?;

        let audit_collection = lookup("AUDIT_COLLECTION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUDIT_COLLECTION.to_string());

        let connect_timeout = lookup("MONGODB_CONNECT_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        let watch_buffer = lookup("WATCH_BUFFER")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_WATCH_BUFFER);

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR is not a valid socket address")?;

        Ok(Self {
            session: SessionConfig {
                uri,
                database,
                audit_collection,
                connect_timeout,
            },
            watch_buffer,
            bind_addr,
        })
    }
}
