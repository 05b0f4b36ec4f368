//! Reliable file transfer over UDP.
//!
//! Implements in-order, byte-exact delivery on top of a lossy datagram
//! socket, with two selectable reliability disciplines:
//!
//! - **Stop-and-Wait**: one frame in flight, retransmitted until its ACK
//!   arrives.
//! - **Go-Back-N**: a sliding window of frames, a single retransmission
//!   timer covering the oldest unacknowledged frame, and cumulative ACKs.
//!   On timeout the whole outstanding window is resent.
//!
//! Every datagram is a [`frame::Frame`]: a 12-byte header (version, kind,
//! flags, seq, ack, all network byte order) followed by a 20-byte SHA-1
//! digest of header and payload, followed by the payload. A corrupted or
//! truncated datagram fails the digest check and is silently discarded; the
//! sender's retransmission covers the loss. The terminal DATA frame carries
//! the FIN flag and an empty payload.
//!
//! The [`net::UdpEndpoint`] wraps a blocking UDP socket and can inject
//! synthetic loss and delay ([`net::Impairment`]), which is how the
//! reliability logic is exercised in tests without a real lossy network.

pub mod bench;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod net;
pub mod receiver;
pub mod sender;

pub use error::{Error, Result};

/// Default maximum payload bytes per DATA frame.
pub const DEFAULT_SEGMENT_SIZE: usize = 1400;

/// Default receive timeout and retransmission timer, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 250;

/// Default Go-Back-N window size.
pub const DEFAULT_GBN_WINDOW: u32 = 8;
