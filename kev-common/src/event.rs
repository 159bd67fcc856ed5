//! # Key Events
//!
//! Purpose: Structured form of one pattern-subscription push announcing a
//! mutation to a key, optionally enriched with the key's current value.
//!
//! ## Push Layout
//!
//! ```text
//! *4
//! [0] message type   "pmessage"
//! [1] pattern        "__keyevent@*:*"
//! [2] channel        "__keyevent@0__:set"
//! [3] key            "foo"
//! ```
//!
//! Elements past index 3 are ignored.

use std::fmt;

use serde::Serialize;

/// Number of elements in the smallest well-formed pattern push.
pub const MIN_PUSH_ELEMENTS: usize = 4;

/// Channel prefix used by key-event notifications.
pub const KEYEVENT_PREFIX: &str = "__keyevent@";

/// Channel prefix used by keyspace notifications.
pub const KEYSPACE_PREFIX: &str = "__keyspace@";

/// Decoded notification delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyEvent {
    /// Always "pmessage" for pattern subscriptions.
    pub message_type: String,
    pub pattern: String,
    pub channel: String,
    pub key: String,
    /// Current value, set only when a lookup is configured and finds the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl KeyEvent {
    /// Builds an event from the elements of a pushed multi-bulk message.
    ///
    /// Returns `None` when the message has fewer than four elements.
    pub fn from_message(message: Vec<String>) -> Option<Self> {
        if message.len() < MIN_PUSH_ELEMENTS {
            return None;
        }
        let mut parts = message.into_iter();
        Some(KeyEvent {
            message_type: parts.next()?,
            pattern: parts.next()?,
            channel: parts.next()?,
            key: parts.next()?,
            value: None,
        })
    }

    /// Database index encoded in a `__keyevent@<db>__:` or
    /// `__keyspace@<db>__:` channel.
    pub fn database(&self) -> Option<u32> {
        let rest = self
            .channel
            .strip_prefix(KEYEVENT_PREFIX)
            .or_else(|| self.channel.strip_prefix(KEYSPACE_PREFIX))?;
        let (db, _) = rest.split_once("__:")?;
        db.parse().ok()
    }

    /// Event name (`set`, `del`, `expired`, ...) for key-event channels.
    pub fn event_name(&self) -> Option<&str> {
        let rest = self.channel.strip_prefix(KEYEVENT_PREFIX)?;
        rest.split_once("__:").map(|(_, event)| event)
    }

    pub fn with_value(mut self, value: Option<String>) -> Self {
        self.value = value;
        self
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type={}, Pattern={}, Channel={}, Key={}, Value={}",
            self.message_type,
            self.pattern,
            self.channel,
            self.key,
            self.value.as_deref().unwrap_or("")
        )
    }
}
