//! # Client Errors
//!
//! Purpose: Type the ways a store conversation can fail so callers branch on
//! recoverability instead of catching a generic failure.
//!
//! ## Taxonomy
//! - `Transport`: socket-level failure; the connection is unusable.
//! - `Protocol`: the byte stream no longer parses; the connection is unusable.
//! - `Remote`: the store answered with an error reply; the stream is still in
//!   sync and the connection may be reused.

use std::io;

use kev_common::InlineArgError;
use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Framing violations found while decoding replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The stream ended before a complete reply was read.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// A reply line carried no type byte.
    #[error("empty reply line")]
    EmptyLine,
    /// The type byte is not one this decoder handles.
    #[error("unexpected reply type {:?}", char::from(*.0))]
    UnknownType(u8),
    /// A bulk length could not be parsed.
    #[error("invalid bulk string length")]
    InvalidLength,
    /// A reply line exceeded the line length limit.
    #[error("reply line longer than {0} bytes")]
    LineTooLong(usize),
    /// A multi-bulk header was missing or malformed.
    #[error("expected multi-bulk header starting with '*'")]
    InvalidHeader,
}

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connect, read or write failure on the socket.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    /// RESP framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Store returned an error reply.
    #[error("store error: {message}")]
    Remote { message: String },
    /// Argument cannot be encoded as an inline command token.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InlineArgError),
    /// A push was requested before the pattern subscription was issued.
    #[error("connection is not subscribed")]
    NotSubscribed,
    /// The subscription connection already issued its pattern subscription.
    #[error("connection is already subscribed")]
    AlreadySubscribed,
    /// The connection was closed explicitly.
    #[error("connection is closed")]
    Closed,
}

impl ClientError {
    /// Returns true when the connection that raised this error is still in
    /// sync with the store and may serve further requests.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClientError::Remote { .. } | ClientError::InvalidArgument(_))
    }

    /// Classifies an io error raised mid-reply. A short read means the peer
    /// went away, which is a framing problem rather than a socket fault.
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ClientError::Protocol(ProtocolError::UnexpectedEof)
        } else {
            ClientError::Transport(err)
        }
    }
}
