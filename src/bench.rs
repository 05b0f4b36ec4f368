//! In-process benchmark: a sender and a receiver wired over loopback, each
//! with its own endpoint, the receiver on its own thread.

use std::fmt;
use std::io::{self, Cursor};
use std::thread;

use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::net::{Impairment, UdpEndpoint};
use crate::receiver::Receiver;
use crate::sender::{GoBackNSender, Protocol, StopAndWaitSender};

/// Outcome of one benchmark run, from the sender's perspective.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    pub protocol: String,
    pub bytes_transferred: u64,
    pub duration_s: f64,
    pub throughput_mbps: f64,
    pub retransmits: u64,
    pub timeouts: u64,
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bench[{}]: {} bytes in {:.3}s ({:.2} Mbit/s) -- {} timeouts, {} retransmits",
            self.protocol,
            self.bytes_transferred,
            self.duration_s,
            self.throughput_mbps,
            self.timeouts,
            self.retransmits
        )
    }
}

/// Pushes `size_bytes` of data through a loopback transfer with the given
/// protocol and impairment, and checks the received bytes are identical.
///
/// Both endpoints share the impairment configuration, so loss hits DATA
/// frames and ACKs alike.
pub fn run_benchmark(
    protocol: Protocol,
    size_bytes: usize,
    loss_rate: f64,
    delay_ms: u64,
    segment_size: usize,
    window_size: u32,
    timeout_ms: u64,
) -> Result<BenchmarkResult> {
    let impairment = Impairment::new(loss_rate, delay_ms);

    let recv_ep = UdpEndpoint::listening("127.0.0.1", 0, timeout_ms, impairment)?;
    let dest = recv_ep.local_addr()?;

    let receiver = thread::spawn(move || -> Result<Vec<u8>> {
        let mut sink = Vec::new();
        Receiver::new(recv_ep, &mut sink).run()?;
        Ok(sink)
    });

    let payload = vec![b'A'; size_bytes];
    let send_ep = UdpEndpoint::sending(timeout_ms, impairment)?;
    info!(%protocol, size_bytes, loss_rate, "benchmark transfer starting");

    let metrics: Metrics = match protocol {
        Protocol::Sw => {
            StopAndWaitSender::new(send_ep, dest, Cursor::new(&payload), segment_size, None).run()?
        }
        Protocol::Gbn => GoBackNSender::new(
            send_ep,
            dest,
            Cursor::new(&payload),
            window_size,
            segment_size,
            timeout_ms,
            None,
        )
        .run()?,
    };

    let received = receiver
        .join()
        .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "receiver thread panicked")))??;
    if received != payload {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "received bytes differ from the transmitted payload",
        )));
    }

    let duration_s = metrics.duration_s().max(0.001);
    Ok(BenchmarkResult {
        protocol: protocol.to_string(),
        bytes_transferred: size_bytes as u64,
        duration_s,
        throughput_mbps: size_bytes as f64 * 8.0 / 1_000_000.0 / duration_s,
        retransmits: metrics.retransmits,
        timeouts: metrics.timeouts,
    })
}
