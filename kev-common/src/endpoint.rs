//! # Endpoint Descriptor
//!
//! Purpose: Describe where the store listens, either a stream-oriented local
//! domain socket or a TCP `host:port` pair.
//!
//! ## Design Principles
//!
//! 1. **Chosen Once**: An endpoint is parsed at startup and never mutated.
//! 2. **Transport Agnostic**: Both connections share the same descriptor and
//!    select the socket family from it.
//! 3. **String Friendly**: Endpoints round-trip through `FromStr`/`Display` so
//!    they can live in CLI flags and TOML files.
//!
//! ## Accepted Forms
//!
//! ```text
//! unix:/var/run/redis/redis.sock   -> Unix("/var/run/redis/redis.sock")
//! /var/run/redis/redis.sock        -> Unix(..)
//! ./redis.sock                     -> Unix(..)
//! tcp://127.0.0.1:6379             -> Tcp("127.0.0.1:6379")
//! 127.0.0.1:6379                   -> Tcp("127.0.0.1:6379")
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const UNIX_PREFIX: &str = "unix:";
const TCP_PREFIX: &str = "tcp://";

/// Errors raised while parsing an endpoint string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("endpoint is empty")]
    Empty,
    #[error("tcp endpoint '{0}' must be host:port")]
    MissingPort(String),
    #[error("tcp endpoint '{0}' has an invalid port")]
    InvalidPort(String),
}

/// Address of the store: a domain socket path or a TCP `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    /// Stream-oriented local domain socket.
    Unix(PathBuf),
    /// TCP socket, kept as `host:port` so hostnames resolve at connect time.
    Tcp(String),
}

impl Endpoint {
    /// Builds a TCP endpoint from host and port.
    pub fn tcp(host: &str, port: u16) -> Self {
        Endpoint::Tcp(format!("{}:{}", host, port))
    }

    /// Builds a domain-socket endpoint.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Endpoint::Unix(path.into())
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Endpoint::Unix(_))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp("127.0.0.1:6379".to_string())
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EndpointError::Empty);
        }
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(EndpointError::Empty);
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') || s.starts_with('.') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }

        let addr = s.strip_prefix(TCP_PREFIX).unwrap_or(s);
        // rsplit keeps bracketed IPv6 hosts intact.
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::MissingPort(addr.to_string()))?;
        if host.is_empty() {
            return Err(EndpointError::MissingPort(addr.to_string()));
        }
        port.parse::<u16>()
            .map_err(|_| EndpointError::InvalidPort(addr.to_string()))?;
        Ok(Endpoint::Tcp(addr.to_string()))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "{}{}", UNIX_PREFIX, path.display()),
            Endpoint::Tcp(addr) => f.write_str(addr),
        }
    }
}
