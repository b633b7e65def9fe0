//! Error taxonomy for the networking core.
//!
//! Each component gets its own error enum rather than one grab-bag type,
//! following the rest of the workspace's `thiserror` usage: callers match on
//! the specific kind they can recover from instead of a generic "network
//! error" blob.

use std::io;

use thiserror::Error;

/// Failures from [`crate::codec`] encode/decode.
///
/// The wire format has no concept of a null message, so there is no
/// `NilMessage` variant here: `encode_state_update`/`encode_input_command`
/// take an owned `&StateUpdate`/`&InputCommand` that always exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before a fixed-size field could be read.
    #[error("buffer truncated while reading {field}")]
    ShortRead { field: &'static str },
    /// An embedded length field (`type_len`, `data_len`, ...) claims more
    /// bytes than remain in the buffer.
    #[error("{field} length {claimed} exceeds remaining buffer ({available} bytes)")]
    BadLength {
        field: &'static str,
        claimed: usize,
        available: usize,
    },
    /// A string or byte-array field exceeds the wire format's length prefix
    /// (`u16` for strings, `u32` for byte arrays) and cannot be encoded.
    #[error("{field} is {len} bytes, which exceeds the wire limit of {max}")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },
    /// Bytes remained in the buffer after a structurally complete decode.
    #[error("{trailing} trailing byte(s) after decoding the message")]
    TrailingBytes { trailing: usize },
    /// A length-prefixed string was not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// Failures surfaced by [`crate::framing`] while reading/writing length-prefixed frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame body length {0} exceeds the maximum of {1}")]
    TooLarge(u32, u32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures reported to the caller of [`crate::server_transport::ServerTransport`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server transport is already running")]
    AlreadyRunning,
    #[error("failed to bind listener: {0}")]
    BindFailed(#[source] io::Error),
    #[error("no client with player id {0}")]
    UnknownPlayer(u64),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failures reported to the caller of [`crate::client_transport::ClientTransport`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client transport is already connected")]
    AlreadyConnected,
    #[error("timed out connecting to server")]
    DialTimeout,
    #[error("failed to connect to server: {0}")]
    DialFailed(#[source] io::Error),
    #[error("client transport is not connected")]
    NotConnected,
    #[error("input queue is full")]
    Backpressure,
}

/// Non-fatal errors surfaced on a transport's `errors` channel. These never
/// tear down the transport; they describe what went wrong with one session
/// (server) or one connection (client) so the game loop can log or react.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Protocol(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("session outbound queue overflowed, dropping connection")]
    QueueOverflow,
}
