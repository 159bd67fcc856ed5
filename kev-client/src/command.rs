//! # Command Connection
//!
//! Purpose: Serve synchronous key lookups over one persistent connection
//! shared by any number of callers.
//!
//! ## Design Principles
//! 1. **One Request In Flight**: A mutex gates the socket so each write and
//!    its reply form one atomic exchange.
//! 2. **No Hidden State**: No caching, no reconnects. A caller that needs
//!    resilience recreates the connection.
//! 3. **Explicit Injection**: Hand an `Arc<CommandConnection>` to whoever
//!    needs lookups; there is no process-wide client.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use kev_common::Endpoint;
use tracing::{trace, warn};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientResult;
use crate::pipeline::ValueLookup;

/// Persistent request/response connection.
pub struct CommandConnection {
    conn: Mutex<Connection>,
}

impl CommandConnection {
    /// Opens the connection with default socket options.
    pub fn connect(endpoint: &Endpoint) -> ClientResult<Self> {
        Self::with_config(endpoint, &ConnectionConfig::default())
    }

    /// Opens the connection with custom socket options.
    pub fn with_config(endpoint: &Endpoint, config: &ConnectionConfig) -> ClientResult<Self> {
        Ok(CommandConnection {
            conn: Mutex::new(Connection::connect(endpoint, config)?),
        })
    }

    /// Fetches a value by key, collapsing a missing key to the empty string.
    pub fn lookup(&self, key: &str) -> ClientResult<String> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// Fetches a value by key.
    ///
    /// Returns `Ok(None)` when the key is missing. A transport or protocol
    /// failure leaves an unread reply behind, so the connection is closed and
    /// later calls fail with `ClientError::Closed`.
    pub fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let mut conn = self.lock();
        let result = match conn.send_inline("GET", &[key]) {
            Ok(()) => conn.read_reply(),
            Err(err) => Err(err),
        };
        match result {
            Ok(reply) => {
                trace!(key, "lookup answered");
                Ok(reply.into_option())
            }
            Err(err) => {
                if !err.is_recoverable() && !conn.is_closed() {
                    warn!(key, error = %err, "lookup connection out of step, closing");
                    conn.close();
                }
                Err(err)
            }
        }
    }

    /// Releases the socket. Later lookups fail with `ClientError::Closed`.
    pub fn close(&self) {
        self.lock().close();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ValueLookup for CommandConnection {
    fn lookup_value(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.get(key)?)
    }
}

impl fmt::Debug for CommandConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandConnection").finish_non_exhaustive()
    }
}

/// Opens a fresh connection, issues one `GET`, and closes it again.
pub fn lookup_once(
    endpoint: &Endpoint,
    config: &ConnectionConfig,
    key: &str,
) -> ClientResult<Option<String>> {
    let mut conn = Connection::connect(endpoint, config)?;
    conn.send_inline("GET", &[key])?;
    let reply = conn.read_reply();
    conn.close();
    Ok(reply?.into_option())
}
