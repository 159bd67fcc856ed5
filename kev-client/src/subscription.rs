//! # Subscription Connection
//!
//! Purpose: Hold the dedicated socket that issues one `PSUBSCRIBE` and then
//! decodes the pushed multi-bulk messages that follow.
//!
//! A subscribed connection only accepts (un)subscribe commands, so it is
//! never used for lookups.

use kev_common::Endpoint;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionConfig, StreamCloser};
use crate::error::{ClientError, ClientResult};

/// Pattern covering key-event notifications of every database.
pub const DEFAULT_PATTERN: &str = "__keyevent@*:*";

pub struct SubscriptionConnection {
    conn: Connection,
    pattern: Option<String>,
}

impl SubscriptionConnection {
    pub fn connect(endpoint: &Endpoint, config: &ConnectionConfig) -> ClientResult<Self> {
        Ok(SubscriptionConnection {
            conn: Connection::connect(endpoint, config)?,
            pattern: None,
        })
    }

    /// Issues `PSUBSCRIBE <pattern>` and reads the confirmation.
    ///
    /// Returns the confirmation elements, normally
    /// `["psubscribe", pattern, count]`. May be called once per connection.
    pub fn subscribe(&mut self, pattern: &str) -> ClientResult<Vec<String>> {
        if self.pattern.is_some() {
            return Err(ClientError::AlreadySubscribed);
        }

        self.conn.send_inline("PSUBSCRIBE", &[pattern])?;
        let confirmation = self.conn.read_multi_bulk()?;
        match confirmation.first() {
            Some(kind) if kind.eq_ignore_ascii_case("psubscribe") => {
                debug!(pattern, confirmation = %confirmation.join(" | "), "subscribed");
            }
            _ => warn!(
                pattern,
                confirmation = %confirmation.join(" | "),
                "unexpected subscription confirmation"
            ),
        }

        self.pattern = Some(pattern.to_string());
        Ok(confirmation)
    }

    /// Blocks until the next pushed message is fully decoded.
    pub fn read_message(&mut self) -> ClientResult<Vec<String>> {
        if self.pattern.is_none() {
            return Err(ClientError::NotSubscribed);
        }
        self.conn.read_multi_bulk()
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Returns a handle that interrupts a blocked `read_message`.
    pub fn closer(&self) -> ClientResult<StreamCloser> {
        self.conn.closer()
    }

    /// Releases the socket. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.conn.close();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}
