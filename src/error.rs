use std::io;

use thiserror::Error;

/// Failure kinds surfaced by the transfer protocol.
///
/// The state machines recover locally from `Malformed` (discard the
/// datagram) and `TimedOut` (retransmit); `RetriesExhausted` and `Io` are
/// fatal and bubble up to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The datagram could not be parsed as a valid frame: too short, bad
    /// checksum, wrong protocol version, or unknown frame kind.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// A receive call expired before any datagram arrived.
    #[error("receive timed out")]
    TimedOut,

    /// A caller-imposed retransmission cap was exceeded.
    #[error("gave up after {0} consecutive timeouts on the same frame")]
    RetriesExhausted(u32),

    /// Underlying socket failure, e.g. the peer is unreachable.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
