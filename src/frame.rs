//! Frame codec: the fixed-layout datagram shared by both directions.
//!
//! Wire layout, all multibyte integers big-endian:
//!
//! ```text
//! version:u8  kind:u8  flags:u16  seq:u32  ack:u32   (12-byte header)
//! sha1(header || payload)                            (20 bytes)
//! payload                                            (0..=segment_size)
//! ```
//!
//! The digest is appended after the header, not embedded in it, so it is
//! computed over the header bytes exactly as transmitted.

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Protocol version carried in every frame.
pub const VERSION: u8 = 1;

/// Flag bit on DATA frames marking the terminal segment of the stream.
pub const FLAG_FIN: u16 = 0x1;

/// Fixed header length: version + kind + flags + seq + ack.
pub const HEADER_LEN: usize = 12;

/// SHA-1 digest length appended after the header.
pub const CHECKSUM_LEN: usize = 20;

/// Bytes on the wire before the payload starts.
pub const OVERHEAD: usize = HEADER_LEN + CHECKSUM_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data = 0,
    Ack = 1,
}

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub kind: FrameKind,
    pub flags: u16,
    pub seq: u32,
    pub ack: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a DATA frame for one segment of the input stream.
    pub fn data(seq: u32, payload: Vec<u8>, fin: bool) -> Self {
        Frame {
            version: VERSION,
            kind: FrameKind::Data,
            flags: if fin { FLAG_FIN } else { 0 },
            seq,
            ack: 0,
            payload,
        }
    }

    /// Builds a cumulative ACK naming the next expected sequence number.
    pub fn ack(ack: u32) -> Self {
        Frame {
            version: VERSION,
            kind: FrameKind::Ack,
            flags: 0,
            seq: 0,
            ack,
            payload: Vec::new(),
        }
    }

    pub fn fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }

    /// Serialises the frame: header, then the SHA-1 of header and payload,
    /// then the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(OVERHEAD + self.payload.len());
        buf.push(self.version);
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());

        let mut hasher = Sha1::new();
        hasher.update(&buf[..HEADER_LEN]);
        hasher.update(&self.payload);
        buf.extend_from_slice(hasher.finalize().as_slice());

        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parses a datagram, verifying length, checksum, version and kind.
    ///
    /// Any failure is reported as [`Error::Malformed`]; callers are expected
    /// to discard the datagram silently and keep receiving.
    pub fn decode(raw: &[u8]) -> Result<Frame> {
        if raw.len() < OVERHEAD {
            return Err(Error::Malformed("datagram shorter than frame overhead"));
        }
        let (header, rest) = raw.split_at(HEADER_LEN);
        let (checksum, payload) = rest.split_at(CHECKSUM_LEN);

        let mut hasher = Sha1::new();
        hasher.update(header);
        hasher.update(payload);
        if hasher.finalize().as_slice() != checksum {
            return Err(Error::Malformed("checksum mismatch"));
        }

        if header[0] != VERSION {
            return Err(Error::Malformed("unsupported protocol version"));
        }
        let kind = match header[1] {
            0 => FrameKind::Data,
            1 => FrameKind::Ack,
            _ => return Err(Error::Malformed("unknown frame kind")),
        };

        Ok(Frame {
            version: header[0],
            kind,
            flags: u16::from_be_bytes([header[2], header[3]]),
            seq: u32::from_be_bytes([header[4], header[5], header[6], header[7]]),
            ack: u32::from_be_bytes([header[8], header[9], header[10], header[11]]),
            payload: payload.to_vec(),
        })
    }
}
