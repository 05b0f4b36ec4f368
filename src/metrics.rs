//! Counters accumulated over one run of a sender or receiver.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

/// Live counters updated by the state machines while a transfer runs.
///
/// For a sender, `bytes_sent` counts payload bytes handed to the endpoint
/// (retransmissions included for Stop-and-Wait, first transmissions only for
/// Go-Back-N, matching what each FSM pushes through `send_to` when it
/// accounts). For a receiver, `bytes_sent` counts payload bytes written to
/// the sink and `packets_sent` counts ACKs.
#[derive(Debug, Clone)]
pub struct Metrics {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub timeouts: u64,
    pub retransmits: u64,
    start: Instant,
    end: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            packets_sent: 0,
            bytes_sent: 0,
            timeouts: 0,
            retransmits: 0,
            start: Instant::now(),
            end: None,
        }
    }

    /// Freezes the wall clock for `duration_s` and `throughput_mbps`.
    pub fn finish(&mut self) {
        self.end = Some(Instant::now());
    }

    /// Seconds between construction and `finish`; 0 while still running.
    pub fn duration_s(&self) -> f64 {
        self.end
            .map(|end| end.duration_since(self.start).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Payload throughput in Mbit/s over the finished run.
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.duration_s();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_sent as f64 * 8.0 / 1_000_000.0 / secs
    }

    /// Flattens the counters into the printable, serialisable report.
    pub fn report(&self, role: &str) -> Report {
        Report {
            role: role.to_string(),
            bytes_sent: self.bytes_sent,
            packets_sent: self.packets_sent,
            timeouts: self.timeouts,
            retransmits: self.retransmits,
            duration_s: self.duration_s(),
            throughput_mbps: self.throughput_mbps(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Final per-run summary printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub role: String,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub timeouts: u64,
    pub retransmits: u64,
    pub duration_s: f64,
    pub throughput_mbps: f64,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} bytes in {:.3}s ({:.2} Mbit/s) -- {} packets, {} timeouts, {} retransmits",
            self.role,
            self.bytes_sent,
            self.duration_s,
            self.throughput_mbps,
            self.packets_sent,
            self.timeouts,
            self.retransmits
        )
    }
}
