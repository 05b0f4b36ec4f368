//! Datagram endpoint: a blocking UDP socket with a pluggable impairment
//! shim.
//!
//! The shim injects synthetic loss and delay on both the send and receive
//! paths so the reliability state machines can be driven through their
//! recovery branches deterministically in-process, without a real lossy
//! network between two hosts.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use tracing::trace;

use crate::error::{Error, Result};

/// Synthetic loss and delay applied per datagram.
///
/// The drop decision is an independent Bernoulli draw on every call, so a
/// `loss_rate` of 0.2 drops roughly one datagram in five regardless of
/// history.
#[derive(Debug, Clone, Copy, Default)]
pub struct Impairment {
    /// Probability in `[0, 1]` of dropping each datagram.
    pub loss_rate: f64,
    /// Fixed delay applied to each surviving datagram, in milliseconds.
    pub delay_ms: u64,
}

impl Impairment {
    pub fn new(loss_rate: f64, delay_ms: u64) -> Self {
        Impairment { loss_rate, delay_ms }
    }

    fn should_drop(&self) -> bool {
        self.loss_rate > 0.0 && rand::random::<f64>() < self.loss_rate
    }

    fn delay(&self) {
        if self.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.delay_ms));
        }
    }
}

/// A bound UDP socket plus its impairment configuration.
///
/// The socket is owned by the endpoint and released exactly once when the
/// endpoint goes out of scope.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    impairment: Impairment,
    timeout: Option<Duration>,
}

impl UdpEndpoint {
    /// Binds a listening endpoint to `host:port`. Port 0 picks an ephemeral
    /// port; see [`UdpEndpoint::local_addr`].
    pub fn listening(
        host: &str,
        port: u16,
        timeout_ms: u64,
        impairment: Impairment,
    ) -> Result<Self> {
        Self::from_socket(UdpSocket::bind((host, port))?, timeout_ms, impairment)
    }

    /// Binds a sending endpoint on an ephemeral local port.
    pub fn sending(timeout_ms: u64, impairment: Impairment) -> Result<Self> {
        Self::from_socket(UdpSocket::bind("0.0.0.0:0")?, timeout_ms, impairment)
    }

    fn from_socket(socket: UdpSocket, timeout_ms: u64, impairment: Impairment) -> Result<Self> {
        // timeout 0 means block indefinitely, matching set_read_timeout(None)
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        socket.set_read_timeout(timeout)?;
        Ok(UdpEndpoint {
            socket,
            impairment,
            timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The configured receive timeout, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Sends one datagram to `addr`.
    ///
    /// The impairment may drop the datagram (the call still succeeds) or
    /// delay it before it leaves the socket.
    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<()> {
        if self.impairment.should_drop() {
            trace!(len = buf.len(), %addr, "impairment dropped outbound datagram");
            return Ok(());
        }
        self.impairment.delay();
        self.socket.send_to(buf, addr)?;
        Ok(())
    }

    /// Receives the next datagram into `buf`.
    ///
    /// Inbound datagrams dropped by the impairment are skipped and the call
    /// keeps waiting for the next one. Expiry of the configured read timeout
    /// is reported as the distinguished [`Error::TimedOut`]; every other
    /// socket failure is fatal.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        loop {
            match self.socket.recv_from(buf) {
                Ok((n, addr)) => {
                    if self.impairment.should_drop() {
                        trace!(len = n, %addr, "impairment dropped inbound datagram");
                        continue;
                    }
                    self.impairment.delay();
                    return Ok((n, addr));
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Err(Error::TimedOut);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}
