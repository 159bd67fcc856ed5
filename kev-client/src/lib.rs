//! # Keyspace Event Client
//!
//! Purpose: Watch a store's keyspace-notification stream over RESP2, decode
//! each push into a `KeyEvent`, and optionally enrich it with the key's value.
//!
//! ## Design Principles
//! 1. **Two Sockets**: A subscribed connection only accepts (un)subscribe
//!    commands, so lookups travel on their own `CommandConnection`.
//! 2. **Blocking I/O on a Worker**: The pipeline is a plain loop on its own
//!    thread; cancellation is checked between messages.
//! 3. **Typed Failures**: Transport, protocol and store errors are distinct
//!    variants so callers branch on recoverability.
//! 4. **Protocol Clarity**: Inline commands out, a small RESP2 subset in.

mod command;
mod connection;
mod error;
mod metrics;
mod pipeline;
mod resp;
mod subscription;

pub use command::{lookup_once, CommandConnection};
pub use connection::{Connection, ConnectionConfig, StreamCloser};
pub use error::{ClientError, ClientResult, ProtocolError};
pub use metrics::PipelineStats;
pub use pipeline::{
    CancelToken, NotificationPipeline, NotifySink, PipelineConfig, PipelineHandle,
    PipelineState, ValueLookup,
};
pub use resp::{encode_inline, read_multi_bulk, read_reply, read_string, RespReply};
pub use subscription::{SubscriptionConnection, DEFAULT_PATTERN};

pub use kev_common::{Endpoint, KeyEvent};
