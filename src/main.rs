//! rftp: reliable file transfer over UDP.
//!
//! Three subcommands:
//!
//! - `send` transmits a file to a listening receiver with Stop-and-Wait or
//!   Go-Back-N.
//! - `recv` accepts one transfer and writes it to a file.
//! - `bench` wires a sender and receiver over loopback in one process and
//!   reports throughput, optionally under synthetic loss and delay.
//!
//! The final report goes to stdout, human-readable or as JSON with
//! `--json`. Progress and recovery events are logged through `tracing`;
//! set `RUST_LOG=debug` (or `trace`) to watch retransmissions happen.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rftp::bench::run_benchmark;
use rftp::net::{Impairment, UdpEndpoint};
use rftp::receiver::Receiver;
use rftp::sender::{GoBackNSender, Protocol, StopAndWaitSender};
use rftp::{DEFAULT_GBN_WINDOW, DEFAULT_SEGMENT_SIZE, DEFAULT_TIMEOUT_MS};

#[derive(Parser, Debug)]
#[command(version, about = "Reliable UDP file transfer (Stop-and-Wait + Go-Back-N)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a file to a listening receiver
    Send(SendArgs),
    /// Receive one transfer and write it to a file
    Recv(RecvArgs),
    /// Run an in-process loopback benchmark
    Bench(BenchArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Receive timeout and retransmission timer, in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Probability in [0, 1] of dropping each datagram (testing aid)
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,

    /// Artificial delay per datagram, in milliseconds (testing aid)
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Maximum payload bytes per DATA frame
    #[arg(long, default_value_t = DEFAULT_SEGMENT_SIZE)]
    segment_size: usize,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Reliability discipline
    #[arg(long, value_enum, default_value_t = Protocol::Gbn)]
    protocol: Protocol,

    /// Sliding window size (Go-Back-N only)
    #[arg(long, default_value_t = DEFAULT_GBN_WINDOW)]
    window_size: u32,

    /// Give up after this many consecutive timeouts on one frame
    #[arg(long)]
    max_retries: Option<u32>,

    /// Receiver host name or address
    #[arg(long)]
    dest_host: String,

    /// Receiver port
    #[arg(long)]
    dest_port: u16,

    /// File to transmit
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args, Debug)]
struct RecvArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    listen_host: String,

    /// Port to bind
    #[arg(long)]
    listen_port: u16,

    /// Where to write the received bytes
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct BenchArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Reliability discipline
    #[arg(long, value_enum, default_value_t = Protocol::Gbn)]
    protocol: Protocol,

    /// Sliding window size (Go-Back-N only)
    #[arg(long, default_value_t = DEFAULT_GBN_WINDOW)]
    window_size: u32,

    /// Number of payload bytes to push through the loopback pair
    #[arg(long, default_value_t = 5_000_000)]
    size_bytes: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Send(args) => cmd_send(args),
        Command::Recv(args) => cmd_recv(args),
        Command::Bench(args) => cmd_bench(args),
    }
}

fn cmd_send(args: SendArgs) -> anyhow::Result<()> {
    let dest = resolve(&args.dest_host, args.dest_port)?;
    let impairment = Impairment::new(args.common.loss_rate, args.common.delay_ms);
    let udp = UdpEndpoint::sending(args.common.timeout_ms, impairment)?;

    let file = File::open(&args.file)
        .with_context(|| format!("opening {}", args.file.display()))?;
    let input = BufReader::new(file);

    let metrics = match args.protocol {
        Protocol::Sw => StopAndWaitSender::new(
            udp,
            dest,
            input,
            args.common.segment_size,
            args.max_retries,
        )
        .run()?,
        Protocol::Gbn => GoBackNSender::new(
            udp,
            dest,
            input,
            args.window_size,
            args.common.segment_size,
            args.common.timeout_ms,
            args.max_retries,
        )
        .run()?,
    };

    print_report(&metrics.report("sender"), args.common.json)
}

fn cmd_recv(args: RecvArgs) -> anyhow::Result<()> {
    let udp = UdpEndpoint::listening(
        &args.listen_host,
        args.listen_port,
        args.common.timeout_ms,
        Impairment::new(args.common.loss_rate, args.common.delay_ms),
    )?;

    let out = File::create(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    let metrics = Receiver::new(udp, BufWriter::new(out)).run()?;

    print_report(&metrics.report("receiver"), args.common.json)
}

fn cmd_bench(args: BenchArgs) -> anyhow::Result<()> {
    let result = run_benchmark(
        args.protocol,
        args.size_bytes,
        args.common.loss_rate,
        args.common.delay_ms,
        args.common.segment_size,
        args.window_size,
        args.common.timeout_ms,
    )?;

    if args.common.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{result}");
    }
    Ok(())
}

fn print_report(report: &rftp::metrics::Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("failed to resolve {host}:{port}"))
}
