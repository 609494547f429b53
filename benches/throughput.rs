//! Throughput Benchmark for relaymux
//!
//! This benchmark measures request parsing, command execution and the full
//! request/response path through a running server.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relaymux::config::{Framing, ServerConfig};
use relaymux::connection::{Connection, ConnectionStats};
use relaymux::protocol::parse_command;
use relaymux::relay::SimulatedBoard;
use relaymux::server::Server;
use relaymux::telemetry::Telemetry;
use relaymux::CommandHandler;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// In-memory stream that replays one batch of input, then would block.
struct Batch {
    input: Vec<u8>,
    pos: usize,
    written: usize,
}

impl Read for Batch {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.input.len() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.input.len() - self.pos);
        buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for Batch {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Benchmark the request parser
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("status", |b| {
        b.iter(|| black_box(parse_command(black_box(b"status\n"))));
    });

    group.bench_function("set_relay", |b| {
        b.iter(|| black_box(parse_command(black_box(b"3 on\n"))));
    });

    group.bench_function("invalid", |b| {
        b.iter(|| black_box(parse_command(black_box(b"abc sideways\n"))));
    });

    group.finish();
}

/// Benchmark parse + execute + serialize against the simulated board
fn bench_execute(c: &mut Criterion) {
    let mut board = SimulatedBoard::default();

    let mut group = c.benchmark_group("execute");
    group.throughput(Throughput::Elements(1));

    group.bench_function("toggle_and_status", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let request: &[u8] = match i % 3 {
                0 => b"1 on",
                1 => b"1 off",
                _ => b"status",
            };
            let response = CommandHandler::new(&mut board).execute(request);
            black_box(response.serialize());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark framing and dispatch of a pipelined batch
fn bench_pipeline(c: &mut Criterion) {
    const BATCH: usize = 1_000;
    let mut input = Vec::new();
    for i in 0..BATCH {
        input.extend_from_slice(if i % 2 == 0 { b"2 on\n" } else { b"status\n" });
    }

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(BATCH as u64));

    group.bench_function("1000_requests", |b| {
        let mut board = SimulatedBoard::default();
        let mut stats = ConnectionStats::new();
        b.iter(|| {
            let stream = Batch {
                input: input.clone(),
                pos: 0,
                written: 0,
            };
            let mut conn = Connection::new(
                stream,
                "127.0.0.1:0".parse().unwrap(),
                Framing::Newline,
                4096,
            );
            conn.on_readable(&mut board, &mut stats).unwrap();
            black_box(conn.stream_mut().written);
        });
    });

    group.finish();
}

/// Benchmark one round trip over loopback through a running server
fn bench_round_trip(c: &mut Criterion) {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    };
    let mut server = Server::with_controller(
        &config,
        Box::new(SimulatedBoard::default()),
        Telemetry::disabled(),
    )
    .unwrap();
    let addr = server.local_addr();
    let handle = server.shutdown_handle();
    let thread = std::thread::spawn(move || {
        server.run().unwrap();
    });

    let mut client = TcpStream::connect(addr).unwrap();
    client.set_nodelay(true).unwrap();

    let mut group = c.benchmark_group("round_trip");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("status", |b| {
        let mut buf = [0u8; 64];
        b.iter(|| {
            client.write_all(b"status\n").unwrap();
            let mut got = 0;
            while got == 0 || buf[got - 1] != b'\n' {
                got += client.read(&mut buf[got..]).unwrap();
            }
            black_box(&buf[..got]);
        });
    });

    group.finish();

    drop(client);
    handle.shutdown().unwrap();
    thread.join().unwrap();
}

criterion_group!(
    benches,
    bench_parse,
    bench_execute,
    bench_pipeline,
    bench_round_trip,
);

criterion_main!(benches);
