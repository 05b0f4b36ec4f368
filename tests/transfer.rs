//! End-to-end transfers: exact frame sequences against a scripted peer,
//! full sender/receiver runs over loopback, and lossy benchmark runs.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor};
use std::net::{SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rftp::bench::run_benchmark;
use rftp::frame::{Frame, FrameKind};
use rftp::metrics::Metrics;
use rftp::net::{Impairment, UdpEndpoint};
use rftp::receiver::Receiver;
use rftp::sender::{GoBackNSender, Protocol, StopAndWaitSender};

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn spawn_receiver(impairment: Impairment) -> (SocketAddr, JoinHandle<(Vec<u8>, Metrics)>) {
    let ep = UdpEndpoint::listening("127.0.0.1", 0, 100, impairment).unwrap();
    let addr = ep.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let mut sink = Vec::new();
        let metrics = Receiver::new(ep, &mut sink).run().unwrap();
        (sink, metrics)
    });
    (addr, handle)
}

/// Acks everything in arrival order and records `(seq, payload, fin)` until
/// the FIN frame shows up. Only usable on a lossless path.
fn scripted_peer(sock: UdpSocket) -> JoinHandle<Vec<(u32, Vec<u8>, bool)>> {
    thread::spawn(move || {
        let mut seen = Vec::new();
        let mut buf = [0u8; 65535];
        loop {
            let (n, from) = sock.recv_from(&mut buf).unwrap();
            let frame = Frame::decode(&buf[..n]).unwrap();
            assert_eq!(frame.kind, FrameKind::Data);
            let fin = frame.fin();
            sock.send_to(&Frame::ack(frame.seq + 1).encode(), from).unwrap();
            seen.push((frame.seq, frame.payload, fin));
            if fin {
                return seen;
            }
        }
    })
}

#[test]
fn sw_lossless_hello_frame_sequence() {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let dest = sock.local_addr().unwrap();
    let peer = scripted_peer(sock);

    let udp = UdpEndpoint::sending(1000, Impairment::default()).unwrap();
    let metrics = StopAndWaitSender::new(udp, dest, Cursor::new(b"hello".to_vec()), 2, None)
        .run()
        .unwrap();

    let frames = peer.join().unwrap();
    assert_eq!(
        frames,
        vec![
            (0, b"he".to_vec(), false),
            (1, b"ll".to_vec(), false),
            (2, b"o".to_vec(), false),
            (3, Vec::new(), true),
        ]
    );
    assert_eq!(metrics.packets_sent, 4);
    assert_eq!(metrics.bytes_sent, 5);
    assert_eq!(metrics.timeouts, 0);
    assert_eq!(metrics.retransmits, 0);
}

#[test]
fn gbn_fin_on_exact_segment_boundary() {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let dest = sock.local_addr().unwrap();
    let peer = scripted_peer(sock);

    let input = patterned(8); // exactly two 4-byte segments
    let udp = UdpEndpoint::sending(1000, Impairment::default()).unwrap();
    let metrics = GoBackNSender::new(udp, dest, Cursor::new(input.clone()), 4, 4, 1000, None)
        .run()
        .unwrap();

    let frames = peer.join().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], (0, input[..4].to_vec(), false));
    assert_eq!(frames[1], (1, input[4..].to_vec(), false));
    assert_eq!(frames[2], (2, Vec::new(), true));
    assert_eq!(metrics.packets_sent, 3);
    assert_eq!(metrics.bytes_sent, 8);
}

#[test]
fn sw_empty_input_sends_lone_fin() {
    let (dest, receiver) = spawn_receiver(Impairment::default());

    let udp = UdpEndpoint::sending(500, Impairment::default()).unwrap();
    let metrics = StopAndWaitSender::new(udp, dest, Cursor::new(Vec::new()), 512, None)
        .run()
        .unwrap();

    let (sink, recv_metrics) = receiver.join().unwrap();
    assert!(sink.is_empty());
    assert_eq!(metrics.packets_sent, 1);
    assert_eq!(metrics.bytes_sent, 0);
    assert_eq!(recv_metrics.bytes_sent, 0);
}

#[test]
fn gbn_file_transfer_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("in.bin");
    let out_path = dir.path().join("out.bin");
    let payload = patterned(50_000);
    fs::write(&in_path, &payload).unwrap();

    let ep = UdpEndpoint::listening("127.0.0.1", 0, 100, Impairment::default()).unwrap();
    let dest = ep.local_addr().unwrap();
    let out = BufWriter::new(File::create(&out_path).unwrap());
    let receiver = thread::spawn(move || Receiver::new(ep, out).run().unwrap());

    let udp = UdpEndpoint::sending(200, Impairment::default()).unwrap();
    let input = BufReader::new(File::open(&in_path).unwrap());
    let metrics = GoBackNSender::new(udp, dest, input, 8, 1000, 200, None)
        .run()
        .unwrap();

    receiver.join().unwrap();
    assert_eq!(fs::read(&out_path).unwrap(), payload);
    assert_eq!(metrics.bytes_sent, 50_000);
}

#[test]
fn sw_transfer_with_lossy_receiver() {
    // loss and delay on the receiver endpoint hit inbound DATA and
    // outbound ACKs alike; the transfer must still converge byte-exact
    let (dest, receiver) = spawn_receiver(Impairment::new(0.3, 1));
    let payload = patterned(2_000);

    let udp = UdpEndpoint::sending(50, Impairment::default()).unwrap();
    StopAndWaitSender::new(udp, dest, Cursor::new(payload.clone()), 256, None)
        .run()
        .unwrap();

    let (sink, _) = receiver.join().unwrap();
    assert_eq!(sink, payload);
}

#[test]
fn gbn_transfer_with_lossy_receiver() {
    let (dest, receiver) = spawn_receiver(Impairment::new(0.25, 0));
    let payload = patterned(30_000);

    let udp = UdpEndpoint::sending(60, Impairment::default()).unwrap();
    GoBackNSender::new(udp, dest, Cursor::new(payload.clone()), 8, 512, 60, None)
        .run()
        .unwrap();

    let (sink, _) = receiver.join().unwrap();
    assert_eq!(sink, payload);
}

#[test]
fn bench_gbn_lossless_has_no_retransmits() {
    let result = run_benchmark(Protocol::Gbn, 10_000, 0.0, 0, 1000, 4, 200).unwrap();
    assert_eq!(result.bytes_transferred, 10_000);
    assert_eq!(result.timeouts, 0);
    assert_eq!(result.retransmits, 0);
    assert!(result.duration_s > 0.0);
}

#[test]
fn bench_gbn_completes_under_loss() {
    // 101 frames at 20% loss on both endpoints: some retransmission is a
    // statistical certainty, completion is guaranteed by the protocol
    let result = run_benchmark(Protocol::Gbn, 100_000, 0.2, 0, 1000, 8, 100).unwrap();
    assert_eq!(result.bytes_transferred, 100_000);
    assert!(result.retransmits > 0);
}

#[test]
fn bench_sw_lossless() {
    let result = run_benchmark(Protocol::Sw, 5_000, 0.0, 0, 500, 1, 200).unwrap();
    assert_eq!(result.bytes_transferred, 5_000);
    assert_eq!(result.retransmits, 0);
}
