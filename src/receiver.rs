//! Receiver state machine: accept in-order DATA frames, acknowledge
//! cumulatively, stop once the FIN segment has been delivered.

use std::io::Write;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameKind};
use crate::metrics::Metrics;
use crate::net::UdpEndpoint;

/// Read-timeout cycles a finished receiver waits while re-acknowledging
/// duplicate retransmissions before releasing the socket. Without this
/// grace period a lost final ACK leaves the sender retransmitting the FIN
/// with nobody left to answer. The sender's retransmission timer comes from
/// the same `timeout_ms` the endpoint's read timeout does, so a multiple of
/// the read timeout always spans several retransmission attempts.
const LINGER_CYCLES: u32 = 8;

/// Writes one transfer to `out`, in order and byte-exact.
pub struct Receiver<W: Write> {
    udp: UdpEndpoint,
    out: W,
}

impl<W: Write> Receiver<W> {
    pub fn new(udp: UdpEndpoint, out: W) -> Self {
        Receiver { udp, out }
    }

    /// Runs the receive loop until the FIN segment has been accepted.
    ///
    /// Only the frame whose sequence number equals the next expected one is
    /// written to the sink; every DATA frame, duplicate or not, is answered
    /// with a cumulative ACK naming the next expected sequence number, so
    /// the sender recovers from lost ACKs as well as lost data.
    pub fn run(&mut self) -> Result<Metrics> {
        let mut metrics = Metrics::new();
        let mut expected: u32 = 0;
        let mut buf = vec![0u8; 65535];

        loop {
            let (n, addr) = match self.udp.recv_from(&mut buf) {
                Ok(v) => v,
                // Housekeeping timeout: nothing arrived, keep listening.
                Err(Error::TimedOut) => continue,
                Err(e) => return Err(e),
            };

            // A corrupted datagram could have been anything; acking a guess
            // risks advancing the sender wrongly, so discard without
            // replying and let retransmission cover it.
            let frame = match Frame::decode(&buf[..n]) {
                Ok(frame) => frame,
                Err(e) => {
                    trace!(%e, len = n, "discarding undecodable datagram");
                    continue;
                }
            };

            if frame.kind != FrameKind::Data {
                continue;
            }

            if frame.seq == expected {
                self.out.write_all(&frame.payload)?;
                metrics.bytes_sent += frame.payload.len() as u64;
                expected += 1;
                trace!(seq = frame.seq, len = frame.payload.len(), fin = frame.fin(), "accepted segment");
            } else {
                debug!(seq = frame.seq, expected, "duplicate or out-of-order segment");
            }

            self.udp.send_to(&Frame::ack(expected).encode(), addr)?;
            metrics.packets_sent += 1;

            // True exactly when the FIN's own payload was just delivered.
            if frame.fin() && frame.seq < expected {
                break;
            }
        }

        metrics.finish();
        self.out.flush()?;
        info!(
            segments = expected,
            bytes = metrics.bytes_sent,
            "transfer complete"
        );

        self.linger(expected, &mut buf)?;
        Ok(metrics)
    }

    /// Keeps re-acking duplicate frames for a grace period after the
    /// transfer, so the sender still gets an answer if our final ACK was
    /// lost. The window is `LINGER_CYCLES` read timeouts, restarted by
    /// every duplicate; it ends once that long passes quietly.
    fn linger(&mut self, expected: u32, buf: &mut [u8]) -> Result<()> {
        let window = match self.udp.read_timeout() {
            Some(timeout) => timeout * LINGER_CYCLES,
            // no read timeout means recv_from can block forever; skip
            None => return Ok(()),
        };
        let mut deadline = Instant::now() + window;
        while Instant::now() < deadline {
            let (n, addr) = match self.udp.recv_from(buf) {
                Ok(v) => v,
                Err(Error::TimedOut) => continue,
                Err(e) => return Err(e),
            };
            if let Ok(frame) = Frame::decode(&buf[..n]) {
                if frame.kind == FrameKind::Data && frame.seq < expected {
                    trace!(seq = frame.seq, "re-acking duplicate after transfer");
                    self.udp.send_to(&Frame::ack(expected).encode(), addr)?;
                    deadline = Instant::now() + window;
                }
            }
        }
        Ok(())
    }
}
