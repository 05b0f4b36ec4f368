//! Sender state machines: Stop-and-Wait and Go-Back-N.
//!
//! Both segment the input stream into payloads of up to `segment_size`
//! bytes, numbered from 0, and finish with a single zero-length FIN frame
//! at the highest sequence number. Stop-and-Wait keeps one frame in flight;
//! Go-Back-N keeps a window of them with one retransmission timer covering
//! the oldest unacknowledged frame, and resends the whole outstanding
//! window when that timer fires.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameKind};
use crate::metrics::Metrics;
use crate::net::UdpEndpoint;

/// Reliability discipline, chosen at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    /// Stop-and-Wait: window of one.
    Sw,
    /// Go-Back-N: sliding window, retransmit everything outstanding on
    /// timeout.
    Gbn,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Sw => "sw",
            Protocol::Gbn => "gbn",
        })
    }
}

/// Reads up to `size` bytes from `input`, refilling short reads so only end
/// of stream produces a chunk smaller than `size`.
fn read_chunk<R: Read>(input: &mut R, size: usize) -> std::io::Result<Vec<u8>> {
    let mut chunk = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = input.read(&mut chunk[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    chunk.truncate(filled);
    Ok(chunk)
}

/// One frame in flight, retransmitted until its ACK arrives.
pub struct StopAndWaitSender<R: Read> {
    udp: UdpEndpoint,
    dest: SocketAddr,
    input: R,
    segment_size: usize,
    max_retries: Option<u32>,
}

impl<R: Read> StopAndWaitSender<R> {
    /// `max_retries` caps consecutive timeouts on one frame; `None` keeps
    /// retransmitting forever.
    pub fn new(
        udp: UdpEndpoint,
        dest: SocketAddr,
        input: R,
        segment_size: usize,
        max_retries: Option<u32>,
    ) -> Self {
        StopAndWaitSender {
            udp,
            dest,
            input,
            segment_size,
            max_retries,
        }
    }

    pub fn run(&mut self) -> Result<Metrics> {
        let mut metrics = Metrics::new();
        let mut seq: u32 = 0;
        let mut buf = vec![0u8; 65535];

        loop {
            let chunk = read_chunk(&mut self.input, self.segment_size)?;
            let fin = chunk.is_empty();
            let payload_len = chunk.len() as u64;
            let encoded = Frame::data(seq, chunk, fin).encode();
            let mut retries = 0u32;

            loop {
                metrics.packets_sent += 1;
                metrics.bytes_sent += payload_len;
                self.udp.send_to(&encoded, self.dest)?;

                let n = match self.udp.recv_from(&mut buf) {
                    Ok((n, _)) => n,
                    Err(Error::TimedOut) => {
                        metrics.timeouts += 1;
                        metrics.retransmits += 1;
                        retries += 1;
                        if let Some(cap) = self.max_retries {
                            if retries > cap {
                                return Err(Error::RetriesExhausted(retries));
                            }
                        }
                        trace!(seq, retries, "timeout, resending");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let ack = match Frame::decode(&buf[..n]) {
                    Ok(frame) => frame,
                    Err(e) => {
                        trace!(%e, "resending after undecodable datagram");
                        continue;
                    }
                };
                if ack.kind != FrameKind::Ack {
                    continue;
                }
                if ack.ack == seq + 1 {
                    seq += 1;
                    break;
                }
                // A stale ACK means the receiver has not seen this segment.
                debug!(got = ack.ack, want = seq + 1, "stale ack, resending");
                metrics.retransmits += 1;
            }

            if fin {
                break;
            }
        }

        metrics.finish();
        Ok(metrics)
    }
}

/// Sliding-window sender with cumulative ACKs and a single timer.
pub struct GoBackNSender<R: Read> {
    udp: UdpEndpoint,
    dest: SocketAddr,
    input: R,
    window_size: u32,
    segment_size: usize,
    timeout: Duration,
    max_retries: Option<u32>,

    /// Oldest unacknowledged sequence number.
    base: u32,
    /// Next sequence number to transmit.
    next_seq: u32,
    /// Started when the oldest outstanding frame was (re)sent; absent while
    /// nothing is outstanding.
    timer_start: Option<Instant>,
    /// Encoded frames for `[base, next_seq)`, never more than `window_size`.
    window: BTreeMap<u32, Vec<u8>>,
    /// Set once segmentation has produced the FIN frame.
    eof_loaded: bool,
}

impl<R: Read> GoBackNSender<R> {
    pub fn new(
        udp: UdpEndpoint,
        dest: SocketAddr,
        input: R,
        window_size: u32,
        segment_size: usize,
        timeout_ms: u64,
        max_retries: Option<u32>,
    ) -> Self {
        GoBackNSender {
            udp,
            dest,
            input,
            window_size: window_size.max(1),
            segment_size,
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            base: 0,
            next_seq: 0,
            timer_start: None,
            window: BTreeMap::new(),
            eof_loaded: false,
        }
    }

    pub fn run(&mut self) -> Result<Metrics> {
        let mut metrics = Metrics::new();
        let mut buf = vec![0u8; 65535];
        let mut consecutive_timeouts = 0u32;

        loop {
            self.fill_window(&mut metrics)?;

            match self.udp.recv_from(&mut buf) {
                Ok((n, _)) => match Frame::decode(&buf[..n]) {
                    Ok(frame) if frame.kind == FrameKind::Ack => {
                        if self.handle_ack(frame.ack) {
                            consecutive_timeouts = 0;
                        }
                    }
                    // DATA frames have no business arriving at a sender.
                    Ok(_) => {}
                    Err(e) => trace!(%e, "ignoring undecodable datagram"),
                },
                Err(Error::TimedOut) => {}
                Err(e) => return Err(e),
            }

            if self.timer_expired() {
                consecutive_timeouts += 1;
                if let Some(cap) = self.max_retries {
                    if consecutive_timeouts > cap {
                        return Err(Error::RetriesExhausted(consecutive_timeouts));
                    }
                }
                self.retransmit_window(&mut metrics)?;
            }

            if self.eof_loaded && self.base == self.next_seq {
                break;
            }
        }

        metrics.finish();
        Ok(metrics)
    }

    /// Transmits new segments until the window is full or the FIN has been
    /// produced. The FIN guard keeps segmentation from running past end of
    /// stream, so exactly one FIN frame ever exists.
    fn fill_window(&mut self, metrics: &mut Metrics) -> Result<()> {
        while self.next_seq < self.base + self.window_size && !self.eof_loaded {
            let chunk = read_chunk(&mut self.input, self.segment_size)?;
            let fin = chunk.is_empty();
            let payload_len = chunk.len() as u64;
            let encoded = Frame::data(self.next_seq, chunk, fin).encode();

            self.udp.send_to(&encoded, self.dest)?;
            metrics.packets_sent += 1;
            metrics.bytes_sent += payload_len;
            if self.timer_start.is_none() {
                self.timer_start = Some(Instant::now());
            }
            trace!(seq = self.next_seq, len = payload_len, fin, "sent segment");

            self.window.insert(self.next_seq, encoded);
            self.next_seq += 1;
            if fin {
                self.eof_loaded = true;
            }
        }
        Ok(())
    }

    fn timer_expired(&self) -> bool {
        self.timer_start
            .is_some_and(|started| started.elapsed() >= self.timeout)
    }

    /// Go-Back-N recovery: resend every frame in `[base, next_seq)` in
    /// ascending order and restart the timer.
    fn retransmit_window(&mut self, metrics: &mut Metrics) -> Result<()> {
        metrics.timeouts += 1;
        metrics.retransmits += (self.next_seq - self.base) as u64;
        debug!(
            base = self.base,
            next_seq = self.next_seq,
            "timeout, retransmitting window"
        );
        for (seq, encoded) in &self.window {
            self.udp.send_to(encoded, self.dest)?;
            trace!(seq = *seq, "retransmitted");
        }
        self.timer_start = Some(Instant::now());
        Ok(())
    }

    /// Advances the window on a cumulative ACK; returns whether `base`
    /// moved. Stale ACKs (`ack <= base`) are ignored and leave the timer
    /// untouched, so duplicates are idempotent.
    fn handle_ack(&mut self, ack: u32) -> bool {
        if ack <= self.base {
            trace!(ack, base = self.base, "stale ack ignored");
            return false;
        }
        self.window = self.window.split_off(&ack);
        self.base = ack;
        // the timer now covers the new oldest outstanding frame, if any
        self.timer_start = if self.base == self.next_seq {
            None
        } else {
            Some(Instant::now())
        };
        trace!(base = self.base, next_seq = self.next_seq, "window advanced");
        true
    }
}
